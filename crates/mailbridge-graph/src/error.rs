//! Error types for Graph mail sending

use std::time::Duration;
use thiserror::Error;

/// Result type for send operations
pub type SendResult<T> = Result<T, SendError>;

/// Errors that can occur while submitting a message
#[derive(Debug, Error)]
pub enum SendError {
    /// Message failed local validation (no recipients, no sender)
    #[error("message is malformed: {0}")]
    Malformed(String),

    /// A single attachment exceeds the per-attachment limit
    #[error("attachment '{name}' is {size} bytes (limit {limit})")]
    AttachmentTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    /// The message as a whole exceeds the request ceiling
    #[error("message payload is {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Graph rejected the access token (401/403)
    #[error("access token was rejected ({status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    /// Throttling or server-side failure (429/5xx); safe to retry with backoff
    #[error("Graph API temporarily unavailable ({status}): {detail}")]
    Transient { status: u16, detail: String },

    /// The bounded send deadline elapsed; the connection was abandoned
    #[error("send did not complete within {0:?}")]
    Timeout(Duration),

    /// Graph rejected the message itself; retrying the same payload cannot succeed
    #[error("Graph API rejected the message ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Transport-level failure before a status was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

impl SendError {
    /// Whether a caller-side retry with backoff can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SendError::Transient { .. } | SendError::Timeout(_) | SendError::RequestFailed(_)
        )
    }
}
