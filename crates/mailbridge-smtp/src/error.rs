//! Error types for SMTP operations

use thiserror::Error;

/// Result type for SMTP operations
pub type SmtpResult<T> = Result<T, SmtpError>;

/// Errors that can occur during SMTP operations
#[derive(Debug, Error)]
pub enum SmtpError {
    /// Relay could not be reached or negotiated
    #[error("failed to connect to SMTP server: {0}")]
    ConnectionFailed(String),

    /// An address did not parse as a mailbox
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("failed to build message: {0}")]
    MessageBuildError(String),

    /// Relay refused or dropped the message
    #[error("failed to send message: {0}")]
    SendFailed(String),
}
