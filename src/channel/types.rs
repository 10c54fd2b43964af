// src/channel/types.rs
// Progress channel events and error definitions

use std::time::Duration;
use thiserror::Error;

/// One event delivered by a progress channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Raw message payload (expected to be a JSON object)
    Message(String),
    /// Transport-level error with the transport's own reason string
    Error(String),
}

/// Channel error types with retry classification
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Session id is empty")]
    EmptySessionId,

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Channel already consumed")]
    AlreadyConsumed,
}

impl ChannelError {
    /// Returns true if opening the channel again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::ConnectionFailed(_) | ChannelError::ConnectTimeout(_)
        )
    }
}
