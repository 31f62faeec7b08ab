use thiserror::Error;

use crate::handshake::HandshakePhase;

pub type Result<T> = std::result::Result<T, PageRecorderError>;

#[derive(Error, Debug)]
pub enum PageRecorderError {
    #[error("{phase} handshake timed out after {timeout_ms}ms (correlation id {correlation_id})")]
    HandshakeTimeout {
        phase: HandshakePhase,
        correlation_id: String,
        timeout_ms: u64,
    },

    #[error("{phase} handshake failed: {message}")]
    HandshakeFailure {
        phase: HandshakePhase,
        message: String,
    },

    #[error("Page message channel closed")]
    ChannelClosed,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid DOM hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Registration interceptor already installed")]
    AlreadyInstalled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PageRecorderError {
    /// True for the two handshake outcomes that are expected in normal
    /// operation and only warrant a warning.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            PageRecorderError::HandshakeTimeout { .. } | PageRecorderError::HandshakeFailure { .. }
        )
    }
}
