//! Outgoing mail server configuration

use mailbridge_auth::Credential;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classic SMTP relay settings kept alongside the Graph credential
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpServerConfig {
    /// Relay hostname
    pub host: String,
    /// Relay port (587 for STARTTLS)
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
}

impl fmt::Debug for SmtpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One outgoing mail server as the host persists it.
///
/// The host renders the configuration UI and stores these fields; this crate
/// only reads them to pick a transport per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Route messages through the Graph API instead of SMTP
    pub use_graph_api: bool,
    /// Azure credential, required for the Graph transport
    pub credential: Option<Credential>,
    /// Retry a failed Graph send over SMTP when a relay is configured
    pub fallback_to_smtp: bool,
    /// Relay settings for the SMTP transport
    pub smtp: Option<SmtpServerConfig>,
}

impl ServerConfig {
    /// Graph-only configuration, no fallback
    pub fn graph(credential: Credential) -> Self {
        Self {
            use_graph_api: true,
            credential: Some(credential),
            fallback_to_smtp: false,
            smtp: None,
        }
    }

    /// Transport this server uses for a message
    pub fn transport(&self) -> Transport {
        if self.use_graph_api && self.credential.is_some() {
            Transport::Graph
        } else if self.smtp.is_some() {
            Transport::Smtp
        } else {
            Transport::Unconfigured
        }
    }

    /// Relay to fall back to after a failed Graph send, if the operator
    /// enabled the fallback
    pub fn smtp_fallback(&self) -> Option<&SmtpServerConfig> {
        if self.fallback_to_smtp {
            self.smtp.as_ref()
        } else {
            None
        }
    }
}

/// Which transport carries a given message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Graph,
    Smtp,
    Unconfigured,
}
