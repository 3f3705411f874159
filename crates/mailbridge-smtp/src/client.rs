//! SMTP client used when a server is configured to fall back from Graph

use crate::{SmtpError, SmtpResult};
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailbridge_graph::OutgoingMessage;
use std::time::Duration;
use tracing::info;

/// Default bound on the SMTP exchange, mirroring the Graph send deadline
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// STARTTLS SMTP client for a single relay
pub struct SmtpClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SmtpClient {
    /// Create a client for the given relay
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }

    /// Office 365 relay, the usual fallback for Graph-configured tenants
    pub fn office365() -> Self {
        Self::new("smtp.office365.com", 587)
    }

    /// Override the exchange deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send with password authentication (PLAIN)
    pub async fn send_password(
        &self,
        username: &str,
        password: &str,
        message: &OutgoingMessage,
    ) -> SmtpResult<()> {
        info!("Sending email via SMTP with password auth");
        let mail = build_mime_message(message)?;
        self.deliver(mail, username, password, Mechanism::Plain).await
    }

    /// Send with an OAuth2 access token (XOAUTH2); lettre builds and encodes
    /// the XOAUTH2 string from the raw token
    pub async fn send_xoauth2(
        &self,
        email: &str,
        access_token: &str,
        message: &OutgoingMessage,
    ) -> SmtpResult<()> {
        info!("Sending email via SMTP with XOAUTH2");
        let mail = build_mime_message(message)?;
        self.deliver(mail, email, access_token, Mechanism::Xoauth2).await
    }

    async fn deliver(
        &self,
        mail: Message,
        user: &str,
        secret: &str,
        mechanism: Mechanism,
    ) -> SmtpResult<()> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| SmtpError::ConnectionFailed(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(user.to_string(), secret.to_string()))
            .authentication(vec![mechanism])
            .timeout(Some(self.timeout))
            .build();

        transport
            .send(mail)
            .await
            .map_err(|e| SmtpError::SendFailed(e.to_string()))?;

        info!("Email sent successfully via SMTP");
        Ok(())
    }
}

fn mailbox(address: &str, name: Option<&str>) -> SmtpResult<Mailbox> {
    let parsed = address
        .parse()
        .map_err(|e| SmtpError::InvalidAddress(format!("{}: {}", address, e)))?;
    Ok(Mailbox::new(name.map(str::to_string), parsed))
}

/// Assemble a MIME message from the shared outgoing model
pub fn build_mime_message(msg: &OutgoingMessage) -> SmtpResult<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&msg.from, msg.from_name.as_deref())?)
        .subject(&msg.subject);

    for to in &msg.to {
        builder = builder.to(mailbox(to, None)?);
    }
    for cc in &msg.cc {
        builder = builder.cc(mailbox(cc, None)?);
    }
    for bcc in &msg.bcc {
        builder = builder.bcc(mailbox(bcc, None)?);
    }

    if let Some(reply_to) = &msg.in_reply_to {
        builder = builder.in_reply_to(reply_to.clone());
    }
    if !msg.references.is_empty() {
        builder = builder.references(msg.references.join(" "));
    }

    let mut alternative = MultiPart::alternative().build();
    if let Some(text) = &msg.text_body {
        alternative = alternative.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text.clone()),
        );
    }
    if let Some(html) = &msg.html_body {
        alternative = alternative.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html.clone()),
        );
    }
    if msg.text_body.is_none() && msg.html_body.is_none() {
        alternative = alternative.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(String::new()),
        );
    }

    let content = if msg.attachments.is_empty() {
        alternative
    } else {
        let mut mixed = MultiPart::mixed().multipart(alternative);
        for att in &msg.attachments {
            let content_type = att
                .mime_type
                .parse::<ContentType>()
                .unwrap_or(ContentType::parse("application/octet-stream").unwrap());
            mixed = mixed
                .singlepart(Attachment::new(att.filename.clone()).body(att.data.clone(), content_type));
        }
        mixed
    };

    builder
        .multipart(content)
        .map_err(|e| SmtpError::MessageBuildError(e.to_string()))
}
