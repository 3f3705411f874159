//! Token state and the TokenManager
//!
//! One TokenManager per sending identity. It is the only writer of
//! [`TokenState`]: the host persists snapshots but never mutates them.
//! Grant selection follows the Microsoft identity platform v2 endpoints:
//! authorization-code for the initial interactive consent, refresh-token
//! while a refresh token is held, client-credentials (app-only) otherwise.

use crate::{AuthError, AuthResult};
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, StandardErrorResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Microsoft identity platform base URL
pub const LOGIN_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Safety margin subtracted from token expiry so a token cannot expire
/// mid-request (5 minutes, matching the Azure default token lifetime slack)
pub const EXPIRY_SKEW_SECS: i64 = 300;

/// Delegated scopes requested for mail sending
const MAIL_SEND_SCOPE: &str = "https://graph.microsoft.com/Mail.Send";
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// App-only scope used by the client-credentials grant
const APP_ONLY_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Assumed token lifetime when the endpoint omits expires_in
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Azure application credential for one sending identity.
///
/// Immutable once configured; supplied by an operator from the app
/// registration. `redirect_uri` is only needed for the interactive
/// authorization-code flow.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Azure app (client) ID
    pub client_id: String,
    /// Azure app client secret
    pub client_secret: String,
    /// Azure directory (tenant) ID
    pub tenant_id: String,
    /// Mailbox address to send from
    pub sender_email: String,
    /// Redirect URI registered for the authorization-code flow
    pub redirect_uri: Option<String>,
}

impl Credential {
    fn require_complete(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::IncompleteCredential("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::IncompleteCredential("client_secret"));
        }
        if self.tenant_id.is_empty() {
            return Err(AuthError::IncompleteCredential("tenant_id"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("tenant_id", &self.tenant_id)
            .field("sender_email", &self.sender_email)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Access/refresh token pair with its expiry instant (Unix seconds).
///
/// `access_token` and `expires_at` are always written together; the refresh
/// token is carried forward when a refresh response omits one.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenState {
    /// Bearer token for Graph API calls
    pub access_token: String,
    /// Refresh token, absent for app-only (client-credentials) tokens
    pub refresh_token: Option<String>,
    /// Expiry timestamp (Unix seconds)
    pub expires_at: i64,
}

impl TokenState {
    /// Check if the access token is expired or inside the skew window
    pub fn is_expired(&self) -> bool {
        self.expires_at - Utc::now().timestamp() < EXPIRY_SKEW_SECS
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &format!("<{} chars>", self.access_token.len()))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|t| format!("<{} chars>", t.len())),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Which grant a token request used, for error classification
enum Grant {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

/// Owns the OAuth2 state for one sending identity and guarantees a valid
/// access token before each send.
///
/// Safe to share between concurrent senders: the refresh critical section is
/// serialized behind an async mutex and the expiry is re-checked under the
/// lock, so racing callers trigger at most one refresh request.
pub struct TokenManager {
    credential: Credential,
    oauth: BasicClient,
    state: Mutex<Option<TokenState>>,
}

impl TokenManager {
    /// Create a manager with no token yet (first token comes from
    /// [`authorize`](Self::authorize) or the client-credentials grant)
    pub fn new(credential: Credential) -> AuthResult<Self> {
        Self::with_state(credential, None)
    }

    /// Create a manager seeded with a persisted [`TokenState`]
    pub fn with_state(credential: Credential, state: Option<TokenState>) -> AuthResult<Self> {
        Self::with_authority(credential, state, LOGIN_AUTHORITY)
    }

    /// Same as [`with_state`](Self::with_state) against a non-default
    /// identity endpoint (sovereign clouds, tests)
    pub fn with_authority(
        credential: Credential,
        state: Option<TokenState>,
        authority: &str,
    ) -> AuthResult<Self> {
        credential.require_complete()?;

        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            authority, credential.tenant_id
        ))
        .map_err(|e| AuthError::InvalidConfig(format!("invalid authorize URL: {}", e)))?;
        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            authority, credential.tenant_id
        ))
        .map_err(|e| AuthError::InvalidConfig(format!("invalid token URL: {}", e)))?;

        // Microsoft expects client_secret_post, not HTTP basic auth
        let mut oauth = BasicClient::new(
            ClientId::new(credential.client_id.clone()),
            Some(ClientSecret::new(credential.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        if let Some(uri) = &credential.redirect_uri {
            let redirect = RedirectUrl::new(uri.clone())
                .map_err(|e| AuthError::InvalidConfig(format!("invalid redirect URI: {}", e)))?;
            oauth = oauth.set_redirect_uri(redirect);
        }

        Ok(Self {
            credential,
            oauth,
            state: Mutex::new(state),
        })
    }

    /// Mailbox address this manager authenticates for
    pub fn sender_email(&self) -> &str {
        &self.credential.sender_email
    }

    /// Snapshot of the current token state, for host-side persistence
    pub async fn token_state(&self) -> Option<TokenState> {
        self.state.lock().await.clone()
    }

    /// URL the operator visits to grant Mail.Send consent.
    ///
    /// `state` is round-tripped through the redirect so the host can match
    /// the callback to its configuration record.
    pub fn authorization_url(&self, state: &str) -> String {
        let state = state.to_string();
        let (url, _csrf) = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new(MAIL_SEND_SCOPE.to_string()))
            .add_scope(Scope::new(OFFLINE_ACCESS_SCOPE.to_string()))
            .add_extra_param("prompt", "consent")
            .url();
        url.to_string()
    }

    /// Exchange a one-time authorization code for the initial token state.
    ///
    /// Called once per operator setup, with the code delivered to the host's
    /// redirect endpoint.
    pub async fn authorize(&self, auth_code: &str) -> AuthResult<TokenState> {
        info!("Exchanging authorization code for tokens");

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(auth_code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| classify_token_error(e, Grant::AuthorizationCode))?;

        let fresh = token_state_from(&response, None);
        info!(
            "Authorization complete, token valid until {} (refresh token: {})",
            fresh.expires_at,
            fresh.refresh_token.is_some()
        );

        let mut guard = self.state.lock().await;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Return the held token unchanged while it is still valid beyond the
    /// skew window; refresh it otherwise.
    pub async fn ensure_valid_token(&self) -> AuthResult<TokenState> {
        let mut guard = self.state.lock().await;

        if let Some(state) = guard.as_ref() {
            if !state.is_expired() {
                debug!("Using existing token (valid until {})", state.expires_at);
                return Ok(state.clone());
            }
        }

        // Refresh under the lock: concurrent callers park here and find the
        // fresh token on the expiry re-check above when they are resumed.
        info!("Token expired or missing, refreshing");
        let fresh = self.refresh_locked(guard.as_ref()).await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Unconditionally refresh, regardless of the recorded expiry.
    ///
    /// Used by callers after Graph rejects a token that still looked valid
    /// locally (revoked sessions, clock drift).
    pub async fn refresh_now(&self) -> AuthResult<TokenState> {
        let mut guard = self.state.lock().await;
        let fresh = self.refresh_locked(guard.as_ref()).await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    async fn refresh_locked(&self, current: Option<&TokenState>) -> AuthResult<TokenState> {
        match current.and_then(|s| s.refresh_token.clone()) {
            Some(refresh) => {
                info!("Using refresh token grant");
                let response = self
                    .oauth
                    .exchange_refresh_token(&RefreshToken::new(refresh.clone()))
                    .add_scope(Scope::new(MAIL_SEND_SCOPE.to_string()))
                    .add_scope(Scope::new(OFFLINE_ACCESS_SCOPE.to_string()))
                    .request_async(oauth2::reqwest::async_http_client)
                    .await
                    .map_err(|e| classify_token_error(e, Grant::RefreshToken))?;

                let fresh = token_state_from(&response, Some(refresh));
                info!("Token refreshed, valid until {}", fresh.expires_at);
                Ok(fresh)
            }
            None => {
                info!("No refresh token held, using client credentials grant");
                let response = self
                    .oauth
                    .exchange_client_credentials()
                    .add_scope(Scope::new(APP_ONLY_SCOPE.to_string()))
                    .request_async(oauth2::reqwest::async_http_client)
                    .await
                    .map_err(|e| classify_token_error(e, Grant::ClientCredentials))?;

                let fresh = token_state_from(&response, None);
                info!("App-only token acquired, valid until {}", fresh.expires_at);
                Ok(fresh)
            }
        }
    }
}

/// Build a TokenState from a token response, carrying the previous refresh
/// token forward when the endpoint does not rotate it
fn token_state_from(response: &BasicTokenResponse, carried_refresh: Option<String>) -> TokenState {
    let expires_in = response
        .expires_in()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    TokenState {
        access_token: response.access_token().secret().clone(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(carried_refresh),
        expires_at: Utc::now().timestamp() + expires_in,
    }
}

fn classify_token_error<RE>(
    err: RequestTokenError<RE, StandardErrorResponse<BasicErrorResponseType>>,
    grant: Grant,
) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let detail = match response.error_description() {
                Some(description) => format!("{}: {}", response.error(), description),
                None => response.error().to_string(),
            };
            match (response.error(), &grant) {
                // A refresh token Microsoft no longer accepts cannot recover
                // without the operator re-running the interactive flow
                (BasicErrorResponseType::InvalidGrant, Grant::RefreshToken) => {
                    AuthError::Revoked(detail)
                }
                _ => AuthError::InvalidGrant(detail),
            }
        }
        RequestTokenError::Request(e) => AuthError::Network(e.to_string()),
        RequestTokenError::Parse(e, _) => AuthError::MalformedResponse(e.to_string()),
        RequestTokenError::Other(e) => AuthError::Network(e),
    }
}
