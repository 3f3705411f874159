//! Error types for the mail facade

use mailbridge_auth::AuthError;
use mailbridge_graph::SendError;
use mailbridge_smtp::SmtpError;
use thiserror::Error;

/// Result type for facade operations
pub type MailResult<T> = Result<T, MailError>;

/// Errors surfaced to the host framework
#[derive(Debug, Error)]
pub enum MailError {
    /// Token acquisition or refresh failed
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Graph submission failed
    #[error("send failed: {0}")]
    Send(#[from] SendError),

    /// SMTP transport failed
    #[error("SMTP send failed: {0}")]
    Smtp(#[from] SmtpError),

    /// Neither Graph nor SMTP is usable for this server
    #[error("no outgoing transport is configured")]
    NotConfigured,
}

impl MailError {
    /// True when only a fresh interactive authorization can recover
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, MailError::Auth(e) if e.requires_reauthorization())
    }
}
