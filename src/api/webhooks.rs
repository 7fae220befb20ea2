use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::error::get_request_id_from_headers;

/// POST /webhooks/paystack
///
/// The body is taken as raw bytes: the signature covers exactly what the
/// provider sent.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    let engine = &state.reconciliation;
    let signature = headers
        .get(engine.signature_header())
        .and_then(|v| v.to_str().ok());

    match engine.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = outcome.label(), "webhook handled");
            Ok(Json(json!({ "status": outcome.label() })))
        }
        Err(e) => {
            let err = AppError::from(e).with_context("paystack webhook");
            Err(match get_request_id_from_headers(&headers) {
                Some(id) => err.with_request_id(id),
                None => err,
            })
        }
    }
}
