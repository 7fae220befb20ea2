pub mod health;
pub mod payments;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::payment_initiation::PaymentInitiationService;
use crate::services::reconciliation::ReconciliationEngine;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub initiation: Arc<PaymentInitiationService>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub health_checker: HealthChecker,
}

/// All HTTP routes with request-id and request logging layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route("/webhooks/paystack", post(webhooks::paystack_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
