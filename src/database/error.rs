use thiserror::Error;

/// Failure classes a store can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    /// A uniqueness or consistency constraint rejected the write.
    Conflict { constraint: String, message: String },
    /// The store could not be reached or timed out.
    Unavailable { message: String },
    /// A stored row could not be mapped back to a domain value.
    Corrupt { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", self.describe())]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Name of the partial unique index allowing one paid transaction per order.
pub const ONE_PAID_PER_ORDER: &str = "transactions_one_paid_per_order";

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn conflict(constraint: &str, message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Conflict {
            constraint: constraint.to_string(),
            message: message.into(),
        })
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Unavailable {
            message: message.into(),
        })
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Corrupt {
            message: message.into(),
        })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Unavailable { .. })
    }

    pub fn is_conflict_on(&self, name: &str) -> bool {
        matches!(&self.kind, DatabaseErrorKind::Conflict { constraint, .. } if constraint == name)
    }

    fn describe(&self) -> String {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => format!("{} {} not found", entity, id),
            DatabaseErrorKind::Conflict {
                constraint,
                message,
            } => format!("constraint {} violated: {}", constraint, message),
            DatabaseErrorKind::Unavailable { message } => format!("store unavailable: {}", message),
            DatabaseErrorKind::Corrupt { message } => format!("corrupt row: {}", message),
            DatabaseErrorKind::Unknown { message } => format!("database error: {}", message),
        }
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            }),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Self::conflict(
                    db_err.constraint().unwrap_or("unique"),
                    db_err.message().to_string(),
                ),
                sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::NotNullViolation => Self::conflict(
                    db_err.constraint().unwrap_or("constraint"),
                    db_err.message().to_string(),
                ),
                _ => Self::new(DatabaseErrorKind::Unknown {
                    message: db_err.message().to_string(),
                }),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::unavailable(err.to_string()),
            other => Self::new(DatabaseErrorKind::Unknown {
                message: other.to_string(),
            }),
        }
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        let kind = match err.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                AppErrorKind::Domain(DomainError::NotFound { entity, id })
            }
            DatabaseErrorKind::Unavailable { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: true,
                })
            }
            other => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: DatabaseError::new(other).to_string(),
                is_retryable: false,
            }),
        };
        AppError::new(kind)
    }
}
