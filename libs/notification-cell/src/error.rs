use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Channel delivery failed: {0}")]
    Delivery(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound(_) => AppError::NotFound(err.to_string()),
            NotificationError::Delivery(msg) => AppError::Internal(msg),
            NotificationError::StorageUnavailable(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}
