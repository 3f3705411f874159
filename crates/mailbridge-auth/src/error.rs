//! Error types for the auth module

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur during token acquisition
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity platform rejected the grant (bad code, bad client, bad scope)
    #[error("authorization was rejected: {0}")]
    InvalidGrant(String),

    /// The refresh token is no longer valid; interactive re-authorization required
    #[error("refresh token is no longer valid: {0}")]
    Revoked(String),

    /// The token endpoint could not be reached
    #[error("network error during token exchange: {0}")]
    Network(String),

    /// The token endpoint answered with something that is not a token response
    #[error("unreadable token response: {0}")]
    MalformedResponse(String),

    /// A required credential field is empty
    #[error("credential is missing {0}")]
    IncompleteCredential(&'static str),

    /// Invalid endpoint or redirect configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Terminal failures that an operator must resolve by re-running the
    /// interactive authorization; retrying them automatically cannot succeed.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, AuthError::Revoked(_))
    }
}
