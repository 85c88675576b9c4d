use thiserror::Error;

use super::status::AppointmentStatus;

/// Every failure the scheduling core reports. Each call surfaces exactly one
/// of these; the core never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no available slot for the requested professional and time")]
    SlotUnavailable,

    #[error("status cannot change from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("operation not permitted: {0}")]
    InvalidState(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Timeout or serialization failure in the backing store. The unit of
    /// work was rolled back; retrying the whole operation is safe.
    #[error("backing store unavailable: {0}")]
    TransientStore(String),
}

impl SchedulingError {
    pub fn not_found(what: &str) -> Self {
        SchedulingError::NotFound(what.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::TransientStore(_))
    }
}

impl From<sqlx::Error> for SchedulingError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => SchedulingError::Conflict(db.message().to_string()),
                Some("23503") => SchedulingError::Validation(format!(
                    "unknown reference: {}",
                    db.message()
                )),
                // serialization_failure, deadlock_detected, query_canceled,
                // lock_not_available
                Some("40001") | Some("40P01") | Some("57014") | Some("55P03") => {
                    SchedulingError::TransientStore(db.message().to_string())
                }
                _ => SchedulingError::TransientStore(format!("db error: {e}")),
            },
            sqlx::Error::RowNotFound => SchedulingError::not_found("row"),
            _ => SchedulingError::TransientStore(format!("db error: {e}")),
        }
    }
}
