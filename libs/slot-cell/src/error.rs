use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Hold has expired")]
    Expired,

    #[error("Slot not found: {0}")]
    NotFound(String),

    #[error("Invalid weekly template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid scheduling configuration: {0}")]
    Configuration(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}
