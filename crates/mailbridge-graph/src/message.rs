//! Outgoing message model shared by the Graph and SMTP transports

/// Largest single attachment Graph accepts inline on sendMail (3 MiB)
pub const MAX_ATTACHMENT_BYTES: usize = 3 * 1024 * 1024;

/// Ceiling on total attachment bytes per message (Microsoft restriction)
pub const MAX_TOTAL_ATTACHMENT_BYTES: usize = 35 * 1024 * 1024;

/// Ceiling on the serialized sendMail request
pub const MAX_REQUEST_BYTES: usize = 35 * 1024 * 1024;

/// An attachment to include in an outgoing message
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    /// Filename to display
    pub filename: String,
    /// MIME type (e.g., "application/pdf")
    pub mime_type: String,
    /// Raw file data
    pub data: Vec<u8>,
}

/// Email message to send.
///
/// Constructed fresh per send and never mutated after submission. When both
/// bodies are set the HTML body wins.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// From address
    pub from: String,
    /// From display name
    pub from_name: Option<String>,
    /// To addresses
    pub to: Vec<String>,
    /// CC addresses
    pub cc: Vec<String>,
    /// BCC addresses
    pub bcc: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// In-Reply-To header
    pub in_reply_to: Option<String>,
    /// References header
    pub references: Vec<String>,
    /// File attachments
    pub attachments: Vec<OutgoingAttachment>,
}

impl OutgoingMessage {
    /// Create a new message builder
    pub fn new(from: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            from_name: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            text_body: None,
            html_body: None,
            in_reply_to: None,
            references: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Set the from display name
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    /// Add a To recipient
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a CC recipient
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add a BCC recipient
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Set the plain text body
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Set the In-Reply-To header
    pub fn reply_to_message(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Add a reference
    pub fn reference(mut self, message_id: impl Into<String>) -> Self {
        self.references.push(message_id.into());
        self
    }

    /// Add an attachment
    pub fn attachment(
        mut self,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(OutgoingAttachment {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    /// Number of non-blank addresses across to/cc/bcc
    pub fn recipient_count(&self) -> usize {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .filter(|a| !a.trim().is_empty())
            .count()
    }
}
