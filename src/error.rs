//! Unified error handling for the payments service
//!
//! Every layer keeps its own `thiserror` enum; this module maps them onto a
//! single [`AppError`] with an HTTP status, a stable error code and a message
//! that is safe to show to API clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payments::error::PaymentError;
use crate::services::payment_initiation::InitiationError;
use crate::services::reconciliation::ReconcileError;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "ORDER_ALREADY_PAID")]
    OrderAlreadyPaid,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,

    // External errors
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,

    // Generic
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order does not exist or belongs to another store
    OrderNotFound { order_id: String },
    /// Order already has a paid transaction
    OrderAlreadyPaid { order_id: String },
    /// Webhook reference has no matching transaction
    TransactionNotFound { reference: String },
    /// Webhook signature missing or wrong
    InvalidSignature { reason: String },
    /// Generic lookup miss reported by a store
    NotFound { entity: String, id: String },
}

/// Infrastructure-level errors
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
}

/// External service errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment gateway rejected or failed the request
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Required field missing
    MissingField { field: String },
    /// Field present but unusable
    InvalidField { field: String, reason: String },
    /// Request body could not be decoded
    MalformedBody { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::OrderAlreadyPaid { .. } => 409,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::InvalidSignature { .. } => 400,
                DomainError::NotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(_) => 500,
            // Gateway failures surface as 500 to the storefront client.
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => 500,
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::OrderAlreadyPaid { .. } => ErrorCode::OrderAlreadyPaid,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
                DomainError::NotFound { .. } => ErrorCode::NotFound,
            },
            AppErrorKind::Infrastructure(InfrastructureError::Database { .. }) => {
                ErrorCode::DatabaseError
            }
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => {
                ErrorCode::PaymentProviderError
            }
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::OrderAlreadyPaid { order_id } => {
                    format!("Order '{}' has already been paid", order_id)
                }
                DomainError::TransactionNotFound { reference } => {
                    format!("No transaction with reference '{}'", reference)
                }
                DomainError::InvalidSignature { .. } => "Invalid webhook signature".to_string(),
                DomainError::NotFound { entity, id } => format!("{} '{}' not found", entity, id),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(ExternalError::PaymentProvider {
                provider,
                is_retryable,
                ..
            }) => {
                if *is_retryable {
                    format!(
                        "Payment provider ({}) is temporarily unavailable. Please try again",
                        provider
                    )
                } else {
                    "Payment processing failed. Please contact support".to_string()
                }
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid {}: {}", field, reason)
                }
                ValidationError::MalformedBody { reason } => {
                    format!("Malformed request body: {}", reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Internal detail for logs; never sent to clients.
    pub fn log_detail(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(DomainError::InvalidSignature { reason }) => reason.clone(),
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::External(ExternalError::PaymentProvider { message, .. }) => {
                message.clone()
            }
            _ => self.user_message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from specific error types
// Note: From<DatabaseError> is implemented in database/error.rs

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let kind = match err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::WebhookVerificationError { message } => {
                AppErrorKind::Domain(DomainError::InvalidSignature { reason: message })
            }
            other => {
                let provider = match &other {
                    PaymentError::ProviderError { provider, .. } => provider.clone(),
                    _ => "paystack".to_string(),
                };
                AppErrorKind::External(ExternalError::PaymentProvider {
                    provider,
                    is_retryable: other.is_retryable(),
                    message: other.to_string(),
                })
            }
        };
        AppError::new(kind)
    }
}

impl From<InitiationError> for AppError {
    fn from(err: InitiationError) -> Self {
        match err {
            InitiationError::Validation { message, field } => AppError::validation(field, message),
            InitiationError::OrderNotFound(order_id) => {
                AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                    order_id: order_id.to_string(),
                }))
            }
            InitiationError::OrderAlreadyPaid(order_id) => {
                AppError::new(AppErrorKind::Domain(DomainError::OrderAlreadyPaid {
                    order_id: order_id.to_string(),
                }))
            }
            InitiationError::Gateway(e) => e.into(),
            InitiationError::Store(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Authenticity(reason) => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidSignature { reason }))
            }
            ReconcileError::MalformedPayload(reason) => {
                AppError::new(AppErrorKind::Validation(ValidationError::MalformedBody { reason }))
            }
            ReconcileError::UnknownReference(reference) => {
                AppError::new(AppErrorKind::Domain(DomainError::TransactionNotFound { reference }))
            }
            ReconcileError::Store(e) => e.into(),
        }
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
