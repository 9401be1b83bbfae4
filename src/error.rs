//! Error types and handling for Chargegate
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Chargegate operations
pub type Result<T> = std::result::Result<T, ChargeGateError>;

/// Main error type for Chargegate
#[derive(Debug, Error)]
pub enum ChargeGateError {
    /// Station unreachable or answered with a non-success status
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A field in a device or feed response could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// A value violated a physical or input constraint
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A write command to the station failed
    #[error("Command error: {message}")]
    Command { message: String },

    /// A balance lookup or settlement transfer failed
    #[error("Payment error: {message}")]
    Payment { message: String },

    /// The station already has an operation in progress
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl ChargeGateError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Transport {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Decode {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        ChargeGateError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Command {
            message: message.into(),
        }
    }

    /// Create a new payment error
    pub fn payment<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Payment {
            message: message.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Conflict {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Config {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Web {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        ChargeGateError::Generic {
            message: message.into(),
        }
    }

    /// Whether the poller may retry the read that produced this error.
    ///
    /// Only read-path failures qualify; command and payment failures are
    /// surfaced on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChargeGateError::Transport { .. }
                | ChargeGateError::Decode { .. }
                | ChargeGateError::Validation { .. }
                | ChargeGateError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for ChargeGateError {
    fn from(err: std::io::Error) -> Self {
        ChargeGateError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChargeGateError {
    fn from(err: serde_yaml::Error) -> Self {
        ChargeGateError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChargeGateError {
    fn from(err: serde_json::Error) -> Self {
        ChargeGateError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChargeGateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChargeGateError::timeout(err.to_string())
        } else {
            ChargeGateError::transport(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for ChargeGateError {
    fn from(err: quick_xml::Error) -> Self {
        ChargeGateError::decode(err.to_string())
    }
}
