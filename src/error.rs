use crate::domain::gateway::{GatewayError, GatewayErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Import is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Import row {row} is invalid: {message}")]
    InvalidRow { row: usize, message: String },
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("Callback for unknown token {0}")]
    UnknownToken(String),
    #[error("Callback for token {0} matches an attempt with no live session")]
    OrphanedAttempt(String),
    #[error("Notification failed: {0}")]
    NotificationError(String),
    #[error("Encryption error: {0}")]
    CryptoError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        match err.kind {
            GatewayErrorKind::Rejected => PaymentError::GatewayRejected(err.message),
            GatewayErrorKind::Transport | GatewayErrorKind::InvalidResponse => {
                PaymentError::GatewayUnavailable(err.message)
            }
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
