//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// The device (or its presentation surface) has not been created yet.
    DeviceNotReady,
    /// A handle that was destroyed or never created.
    InvalidResource(String),
    /// An enum combination with no native mapping.
    UnsupportedFormat(String),
    /// The driver rejected a create call.
    CreationFailed(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotReady => write!(f, "graphics device not ready"),
            Self::InvalidResource(msg) => write!(f, "invalid resource: {msg}"),
            Self::UnsupportedFormat(msg) => write!(f, "unsupported format: {msg}"),
            Self::CreationFailed(msg) => write!(f, "creation failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
