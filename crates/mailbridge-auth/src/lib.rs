//! OAuth2 token management for mailbridge
//!
//! Owns the token state for one Microsoft Graph sending identity and keeps a
//! valid access token available ahead of each send. Three grants are used
//! against the Microsoft identity platform v2 endpoints:
//!
//! 1. Authorization code - one-time interactive operator consent
//! 2. Refresh token - routine renewal while a refresh token is held
//! 3. Client credentials - app-only fallback when no refresh token exists

mod error;
mod token;

pub use error::{AuthError, AuthResult};
pub use token::{Credential, TokenManager, TokenState, EXPIRY_SKEW_SECS, LOGIN_AUTHORITY};
