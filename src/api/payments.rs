use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::services::payment_initiation::{InitiatePaymentRequest, InitiatePaymentResponse};

/// Header identifying the storefront tenant making the request.
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Body of `POST /api/payments/initiate`. Fields are optional here so that a
/// missing one is reported by name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentBody {
    pub order_id: Option<String>,
    pub email: Option<String>,
    /// JSON number or numeric string, in major units.
    pub amount: Option<JsonValue>,
    pub currency: Option<String>,
}

impl InitiatePaymentBody {
    fn into_request(self) -> AppResult<InitiatePaymentRequest> {
        let order_id = required(self.order_id, "orderId")?;
        let order_id = Uuid::parse_str(order_id.trim())
            .map_err(|_| AppError::validation("orderId", "must be a UUID"))?;

        let amount = match self.amount {
            None | Some(JsonValue::Null) => return Err(missing("amount")),
            Some(JsonValue::Number(n)) => BigDecimal::from_str(&n.to_string()),
            Some(JsonValue::String(s)) => BigDecimal::from_str(s.trim()),
            Some(_) => return Err(AppError::validation("amount", "must be a number")),
        }
        .map_err(|_| AppError::validation("amount", "must be a number"))?;

        Ok(InitiatePaymentRequest {
            order_id,
            email: required(self.email, "email")?,
            amount,
            currency: required(self.currency, "currency")?,
        })
    }
}

fn missing(field: &str) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
        field: field.to_string(),
    }))
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| missing(field))
}

fn store_id(headers: &HeaderMap) -> AppResult<Uuid> {
    let raw = headers
        .get(STORE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| missing(STORE_ID_HEADER))?;
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::validation(STORE_ID_HEADER, "must be a UUID"))
}

/// POST /api/payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<InitiatePaymentBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<InitiatePaymentResponse>)> {
    let request_id = get_request_id_from_headers(&headers);
    let tag = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let Json(body) = body.map_err(|rejection| {
        tag(AppError::new(AppErrorKind::Validation(
            ValidationError::MalformedBody {
                reason: rejection.body_text(),
            },
        )))
    })?;
    let store_id = store_id(&headers).map_err(tag)?;
    let request = body.into_request().map_err(tag)?;
    let order_id = request.order_id;

    let response = state
        .initiation
        .initiate(store_id, request)
        .await
        .map_err(|e| tag(AppError::from(e).with_context(format!("order {}", order_id))))?;

    info!(
        reference = %response.reference,
        order_id = %order_id,
        store_id = %store_id,
        "payment initiated"
    );
    Ok((StatusCode::CREATED, Json(response)))
}
