//! # Crate-Wide Error Types
//!
//! Aggregates the per-concern errors into a single type for callers that wire
//! the whole adapter together.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Messaging(#[from] crate::messaging::MessagingError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl AdapterError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
