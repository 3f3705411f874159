//! The facade the host's mail pipeline calls
//!
//! One send = one token check, at most one refresh, and a bounded number of
//! submissions: a single refresh-then-retry after an unauthorized response,
//! and capped backoff retries for transient failures. Nothing here loops
//! without a bound, and every outcome lands in the diagnostics log before it
//! is surfaced.

use crate::config::{ServerConfig, SmtpServerConfig, Transport};
use crate::diagnostics::{DiagnosticsLog, LogLevel};
use crate::error::{MailError, MailResult};
use mailbridge_auth::{Credential, TokenManager, TokenState};
use mailbridge_graph::{DeliveryReceipt, GraphMailSender, OutgoingMessage, SendError};
use mailbridge_smtp::SmtpClient;
use std::sync::Arc;
use std::time::Duration;

/// Bounds on caller-side retries for one message
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after a transient failure
    pub max_transient_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first failure is final
    pub fn none() -> Self {
        Self {
            max_transient_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    fn backoff_before(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << doublings)
    }
}

/// How a message left the system
#[derive(Debug)]
pub enum Delivery {
    /// Accepted by the Graph API
    Graph(DeliveryReceipt),
    /// Handed to the configured SMTP relay
    Smtp,
}

/// Sends messages for one Graph identity and records every outcome.
///
/// Holds the TokenManager, so concurrent sends through one `Mailer` share
/// token refreshes. The host persists [`TokenState`] snapshots from
/// [`token_state`](Self::token_state) after calls that may refresh.
pub struct Mailer {
    tokens: TokenManager,
    sender: GraphMailSender,
    diagnostics: Arc<DiagnosticsLog>,
    retry: RetryPolicy,
}

impl Mailer {
    /// Mailer against the public Microsoft endpoints
    pub fn new(
        credential: Credential,
        state: Option<TokenState>,
        diagnostics: Arc<DiagnosticsLog>,
    ) -> MailResult<Self> {
        let tokens = TokenManager::with_state(credential, state)?;
        Ok(Self::with_components(tokens, GraphMailSender::new(), diagnostics))
    }

    /// Assemble a mailer from explicitly constructed parts (tests,
    /// non-default endpoints)
    pub fn with_components(
        tokens: TokenManager,
        sender: GraphMailSender,
        diagnostics: Arc<DiagnosticsLog>,
    ) -> Self {
        Self {
            tokens,
            sender,
            diagnostics,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry bounds
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// URL for the operator's one-time consent redirect
    pub fn authorization_url(&self, state: &str) -> String {
        self.tokens.authorization_url(state)
    }

    /// Exchange the authorization code delivered to the host's redirect
    /// endpoint for the initial token state
    pub async fn authorize(&self, auth_code: &str) -> MailResult<TokenState> {
        match self.tokens.authorize(auth_code).await {
            Ok(state) => {
                self.diagnostics.append(
                    LogLevel::Info,
                    format!(
                        "Microsoft authorization completed, token valid until {}",
                        state.expires_at
                    ),
                );
                Ok(state)
            }
            Err(e) => {
                self.diagnostics
                    .append(LogLevel::Error, format!("Microsoft authorization failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Current token state, for host-side persistence
    pub async fn token_state(&self) -> Option<TokenState> {
        self.tokens.token_state().await
    }

    /// Send one message through the Graph API
    pub async fn send(&self, message: &OutgoingMessage) -> MailResult<DeliveryReceipt> {
        let mut state = self.ensure_token().await?;
        let mut transient_retries = 0u32;
        let mut refreshed_after_rejection = false;

        loop {
            let attempt = self
                .sender
                .send(&state.access_token, self.tokens.sender_email(), message)
                .await;

            match attempt {
                Ok(receipt) => {
                    self.diagnostics.append(
                        LogLevel::Info,
                        format!(
                            "Email sent via Graph API to {} recipient(s) (status {})",
                            message.recipient_count(),
                            receipt.status
                        ),
                    );
                    return Ok(receipt);
                }
                Err(SendError::Unauthorized { status, detail }) if !refreshed_after_rejection => {
                    // One forced refresh, one retry; a second rejection is final
                    refreshed_after_rejection = true;
                    self.diagnostics.append(
                        LogLevel::Warning,
                        format!(
                            "Graph API rejected the access token ({}), refreshing and retrying once: {}",
                            status, detail
                        ),
                    );
                    state = match self.tokens.refresh_now().await {
                        Ok(fresh) => fresh,
                        Err(e) => {
                            self.diagnostics
                                .append(LogLevel::Error, format!("Token refresh failed: {}", e));
                            return Err(e.into());
                        }
                    };
                }
                Err(e) if e.is_retryable() && transient_retries < self.retry.max_transient_retries => {
                    transient_retries += 1;
                    let delay = self.retry.backoff_before(transient_retries);
                    self.diagnostics.append(
                        LogLevel::Warning,
                        format!(
                            "Send attempt failed ({}), retry {}/{} in {:?}",
                            e, transient_retries, self.retry.max_transient_retries, delay
                        ),
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    self.diagnostics
                        .append(LogLevel::Error, format!("Failed to send email via Graph API: {}", e));
                    return Err(e.into());
                }
            }
        }
    }

    /// Send the connection probe the operator triggers from configuration
    pub async fn test_connection(&self) -> MailResult<DeliveryReceipt> {
        let state = self.ensure_token().await?;
        match self
            .sender
            .test_connection(&state.access_token, self.tokens.sender_email())
            .await
        {
            Ok(receipt) => {
                self.diagnostics.append(
                    LogLevel::Info,
                    format!("Graph API connection test succeeded (status {})", receipt.status),
                );
                Ok(receipt)
            }
            Err(e) => {
                self.diagnostics
                    .append(LogLevel::Error, format!("Graph API connection test failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Send via Graph, handing the message to `fallback` when the Graph path
    /// fails and the operator configured a relay for that case
    pub async fn send_with_fallback(
        &self,
        message: &OutgoingMessage,
        fallback: Option<&SmtpServerConfig>,
    ) -> MailResult<Delivery> {
        match self.send(message).await {
            Ok(receipt) => Ok(Delivery::Graph(receipt)),
            Err(e) => match fallback {
                Some(relay) => {
                    self.diagnostics.append(
                        LogLevel::Warning,
                        format!("Graph API send failed ({}), falling back to SMTP", e),
                    );
                    smtp_send(relay, message, &self.diagnostics).await?;
                    Ok(Delivery::Smtp)
                }
                None => Err(e),
            },
        }
    }

    async fn ensure_token(&self) -> MailResult<TokenState> {
        let held = self.tokens.token_state().await.map(|s| s.access_token);
        match self.tokens.ensure_valid_token().await {
            Ok(state) => {
                if held.as_deref() != Some(state.access_token.as_str()) {
                    self.diagnostics.append(
                        LogLevel::Info,
                        format!("Access token refreshed, valid until {}", state.expires_at),
                    );
                }
                Ok(state)
            }
            Err(e) => {
                self.diagnostics.append(
                    LogLevel::Error,
                    format!("Could not obtain a valid access token: {}", e),
                );
                Err(e.into())
            }
        }
    }
}

/// Host boundary: exchange an authorization code for the initial TokenState.
/// The host persists the returned state alongside its credential record.
pub async fn authorize_via_graph_api(
    credential: Credential,
    auth_code: &str,
    diagnostics: Arc<DiagnosticsLog>,
) -> MailResult<TokenState> {
    Mailer::new(credential, None, diagnostics)?.authorize(auth_code).await
}

/// Host boundary: send one message with a persisted TokenState, returning the
/// receipt and the state to persist back (refreshes may have replaced it).
pub async fn send_via_graph_api(
    credential: Credential,
    state: TokenState,
    message: &OutgoingMessage,
    diagnostics: Arc<DiagnosticsLog>,
) -> MailResult<(DeliveryReceipt, TokenState)> {
    let mailer = Mailer::new(credential, Some(state.clone()), diagnostics)?;
    let receipt = mailer.send(message).await?;
    let state = mailer.token_state().await.unwrap_or(state);
    Ok((receipt, state))
}

/// Route one message according to the server configuration: Graph when
/// enabled, the relay otherwise, and the operator-enabled SMTP fallback after
/// a failed Graph send. Returns how the message left and the token state to
/// persist.
pub async fn send_message(
    config: &ServerConfig,
    state: Option<TokenState>,
    message: &OutgoingMessage,
    diagnostics: Arc<DiagnosticsLog>,
) -> MailResult<(Delivery, Option<TokenState>)> {
    match config.transport() {
        Transport::Graph => {
            let Some(credential) = config.credential.clone() else {
                return Err(MailError::NotConfigured);
            };
            let mailer = Mailer::new(credential, state, diagnostics)?;
            let delivery = mailer.send_with_fallback(message, config.smtp_fallback()).await?;
            let state = mailer.token_state().await;
            Ok((delivery, state))
        }
        Transport::Smtp => {
            let Some(relay) = config.smtp.as_ref() else {
                return Err(MailError::NotConfigured);
            };
            smtp_send(relay, message, &diagnostics).await?;
            Ok((Delivery::Smtp, state))
        }
        Transport::Unconfigured => Err(MailError::NotConfigured),
    }
}

async fn smtp_send(
    relay: &SmtpServerConfig,
    message: &OutgoingMessage,
    diagnostics: &DiagnosticsLog,
) -> MailResult<()> {
    let client = SmtpClient::new(&relay.host, relay.port);
    match client.send_password(&relay.username, &relay.password, message).await {
        Ok(()) => {
            diagnostics.append(
                LogLevel::Info,
                format!("Email sent via SMTP relay {}", relay.host),
            );
            Ok(())
        }
        Err(e) => {
            diagnostics.append(LogLevel::Error, format!("SMTP send failed: {}", e));
            Err(e.into())
        }
    }
}
