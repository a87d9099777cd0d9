//! # Messaging Error Types
//!
//! Structured error handling for the relay using thiserror. Listener failures
//! are a separate, serializable type because they ride along inside persisted
//! envelopes (`last_error` / `terminal_error`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::channel::Channel;
use crate::store::StoreError;

/// Failure signal returned by a channel listener.
///
/// Any listener error is treated as transient until the envelope's retry
/// budget is exhausted; the relay never inspects the variant to decide
/// retryability, with one exception: [`ListenerError::NoListener`] is a
/// configuration error and short-circuits to the dead-letter channel.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerError {
    #[error("external request failed: {message}")]
    ExternalRequest { message: String },

    #[error("data reference access failed for asset: {asset_id}")]
    DataReferenceAccess { asset_id: String },

    #[error("invalid message on channel {channel}: {message}")]
    InvalidMessage { channel: Channel, message: String },

    #[error("no listener registered for channel: {channel}")]
    NoListener { channel: Channel },

    #[error("{message}")]
    Other { message: String },
}

impl ListenerError {
    /// Create an external request error
    pub fn external_request(message: impl Into<String>) -> Self {
        Self::ExternalRequest {
            message: message.into(),
        }
    }

    /// Create an invalid message error
    pub fn invalid_message(channel: Channel, message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            channel,
            message: message.into(),
        }
    }

    /// Create a generic listener error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors surfaced to relay callers (`send` / `deliver_ready`).
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("no listener registered for channel: {channel}")]
    NoListener { channel: Channel },

    #[error("message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MessagingError {
    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Result type alias for relay operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_error_display() {
        let err = ListenerError::NoListener {
            channel: Channel::Result,
        };
        assert!(format!("{err}").contains("result"));

        let err = ListenerError::external_request("connection refused");
        assert!(format!("{err}").contains("connection refused"));
    }

    #[test]
    fn test_listener_error_round_trip() {
        let err = ListenerError::invalid_message(Channel::DataReference, "missing agreement id");
        let json = serde_json::to_string(&err).unwrap();
        let back: ListenerError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageDeserialization { .. }
        ));
    }
}
