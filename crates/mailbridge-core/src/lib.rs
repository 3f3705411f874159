//! Core facade for mailbridge
//!
//! Ties the auth, Graph, and SMTP crates together into the contract a host
//! framework calls from its mail pipeline: token lifecycle, bounded send
//! retries, per-message transport selection, and the diagnostics window
//! operators read when a send goes wrong.

mod config;
mod diagnostics;
mod error;
mod mailer;

pub use config::{ServerConfig, SmtpServerConfig, Transport};
pub use diagnostics::{DiagnosticsLog, LogEntry, LogLevel, DEFAULT_LOG_CAPACITY};
pub use error::{MailError, MailResult};
pub use mailer::{
    authorize_via_graph_api, send_message, send_via_graph_api, Delivery, Mailer, RetryPolicy,
};

/// Re-export the boundary types hosts handle directly
pub use mailbridge_auth::{AuthError, Credential, TokenManager, TokenState};
pub use mailbridge_graph::{
    DeliveryReceipt, GraphMailSender, OutgoingAttachment, OutgoingMessage, SendError,
};
pub use mailbridge_smtp::{SmtpClient, SmtpError};
