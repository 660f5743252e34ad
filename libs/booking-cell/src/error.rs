use thiserror::Error;

use shared_models::error::AppError;
use slot_cell::SlotError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("{0}")]
    StateConflict(String),

    #[error("Hold has expired, request a new hold")]
    Expired,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<SlotError> for BookingError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::StateConflict(msg) => BookingError::StateConflict(msg),
            SlotError::Expired => BookingError::Expired,
            SlotError::NotFound(what) => BookingError::NotFound(what),
            SlotError::InvalidTemplate(msg)
            | SlotError::InvalidRange(msg)
            | SlotError::Configuration(msg) => BookingError::Validation(msg),
            SlotError::StorageUnavailable(msg) => BookingError::StorageUnavailable(msg),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::StateConflict(msg) => AppError::Conflict(msg),
            BookingError::Expired => AppError::Gone(err.to_string()),
            BookingError::NotFound(_) => AppError::NotFound(err.to_string()),
            BookingError::Forbidden(msg) => AppError::Forbidden(msg),
            BookingError::Validation(msg) => AppError::BadRequest(msg),
            BookingError::StorageUnavailable(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}
