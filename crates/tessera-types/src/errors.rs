//! Error types for the tessera bring-up layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for tessera operations
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum TesseraError {
    /// Configuration errors (unsupported quant bits, bad quant method, missing collective support)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Device errors (binding, stream creation, memory query)
    #[error("Device error: {message}")]
    Device { message: String },

    /// Device memory exhaustion
    #[error("Out of memory: {message}")]
    OutOfMemory { message: String },

    /// Runtime build errors (missing or malformed artifact, preprocessing)
    #[error("Runtime build error: {message}")]
    RuntimeBuild { message: String },

    /// Orchestration errors (worker pool, sampler binding)
    #[error("Orchestration error: {message}")]
    Orchestration { message: String },

    /// Collective communication group errors
    #[error("Collective error: {message}")]
    Collective { message: String },

    /// A peer failed and released this participant from a rendezvous
    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    /// Timeout errors
    #[error("Operation timed out: {message}")]
    Timeout { message: String },

    /// Not found errors
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Unsupported operation errors
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    IO { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TesseraError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a device error
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Create an out-of-memory error
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }

    /// Create a runtime build error
    pub fn runtime_build(message: impl Into<String>) -> Self {
        Self::RuntimeBuild {
            message: message.into(),
        }
    }

    /// Create an orchestration error
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration {
            message: message.into(),
        }
    }

    /// Create a collective communication error
    pub fn collective(message: impl Into<String>) -> Self {
        Self::Collective {
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IO {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error was raised by a device primitive
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::OutOfMemory { .. })
    }

    /// Check if this is a configuration problem the operator must fix
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Unsupported { .. })
    }

    /// Check if this error only reports that a peer failed first
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The error's message without its category prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message }
            | Self::Device { message }
            | Self::OutOfMemory { message }
            | Self::RuntimeBuild { message }
            | Self::Orchestration { message }
            | Self::Collective { message }
            | Self::Cancelled { message }
            | Self::Timeout { message }
            | Self::NotFound { message }
            | Self::Unsupported { message }
            | Self::InvalidState { message }
            | Self::IO { message }
            | Self::Serialization { message }
            | Self::Internal { message } => message,
        }
    }

    /// Prefix the message with `context`, keeping the category
    pub fn context(mut self, context: impl std::fmt::Display) -> Self {
        let message = match &mut self {
            Self::Config { message }
            | Self::Device { message }
            | Self::OutOfMemory { message }
            | Self::RuntimeBuild { message }
            | Self::Orchestration { message }
            | Self::Collective { message }
            | Self::Cancelled { message }
            | Self::Timeout { message }
            | Self::NotFound { message }
            | Self::Unsupported { message }
            | Self::InvalidState { message }
            | Self::IO { message }
            | Self::Serialization { message }
            | Self::Internal { message } => message,
        };
        *message = format!("{}: {}", context, message);
        self
    }
}

/// Conversion from std::io::Error
impl From<std::io::Error> for TesseraError {
    fn from(err: std::io::Error) -> Self {
        Self::io(format!("{}", err))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("{}", err))
    }
}
