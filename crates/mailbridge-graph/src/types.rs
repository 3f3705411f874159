//! Wire types for the Graph sendMail endpoint

use crate::message::OutgoingMessage;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub(crate) struct SendMailRequest {
    pub message: GraphMessage,
    #[serde(rename = "saveToSentItems")]
    pub save_to_sent_items: bool,
}

#[derive(Serialize)]
pub(crate) struct GraphMessage {
    pub subject: String,
    pub body: GraphBody,
    #[serde(rename = "toRecipients")]
    pub to_recipients: Vec<GraphRecipient>,
    #[serde(rename = "ccRecipients", skip_serializing_if = "Vec::is_empty")]
    pub cc_recipients: Vec<GraphRecipient>,
    #[serde(rename = "bccRecipients", skip_serializing_if = "Vec::is_empty")]
    pub bcc_recipients: Vec<GraphRecipient>,
    #[serde(rename = "internetMessageHeaders", skip_serializing_if = "Vec::is_empty")]
    pub internet_message_headers: Vec<GraphHeader>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<GraphAttachment>,
}

#[derive(Serialize)]
pub(crate) struct GraphBody {
    #[serde(rename = "contentType")]
    pub content_type: &'static str,
    pub content: String,
}

#[derive(Serialize)]
pub(crate) struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    pub email_address: GraphEmailAddress,
}

#[derive(Serialize)]
pub(crate) struct GraphEmailAddress {
    pub address: String,
}

#[derive(Serialize)]
pub(crate) struct GraphHeader {
    pub name: String,
    pub value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphAttachment {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    pub name: String,
    pub content_type: String,
    pub content_bytes: String,
}

impl SendMailRequest {
    /// Assemble the sendMail envelope from an outgoing message
    pub(crate) fn build(message: &OutgoingMessage, save_to_sent_items: bool) -> Self {
        let body = match (&message.html_body, &message.text_body) {
            (Some(html), _) => GraphBody {
                content_type: "HTML",
                content: html.clone(),
            },
            (None, Some(text)) => GraphBody {
                content_type: "Text",
                content: text.clone(),
            },
            (None, None) => GraphBody {
                content_type: "Text",
                content: String::new(),
            },
        };

        let mut headers = Vec::new();
        if let Some(reply_to) = &message.in_reply_to {
            headers.push(GraphHeader {
                name: "In-Reply-To".to_string(),
                value: reply_to.clone(),
            });
        }
        if !message.references.is_empty() {
            headers.push(GraphHeader {
                name: "References".to_string(),
                value: message.references.join(" "),
            });
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let attachments = message
            .attachments
            .iter()
            .map(|att| GraphAttachment {
                odata_type: "#microsoft.graph.fileAttachment",
                name: att.filename.clone(),
                content_type: att.mime_type.clone(),
                content_bytes: engine.encode(&att.data),
            })
            .collect();

        SendMailRequest {
            message: GraphMessage {
                subject: message.subject.clone(),
                body,
                to_recipients: recipients(&message.to),
                cc_recipients: recipients(&message.cc),
                bcc_recipients: recipients(&message.bcc),
                internet_message_headers: headers,
                attachments,
            },
            save_to_sent_items,
        }
    }
}

fn recipients(addresses: &[String]) -> Vec<GraphRecipient> {
    addresses
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| GraphRecipient {
            email_address: GraphEmailAddress {
                address: a.trim().to_string(),
            },
        })
        .collect()
}

/// Error payload Graph returns alongside non-2xx statuses
#[derive(Deserialize)]
struct GraphErrorResponse {
    error: GraphErrorDetail,
}

#[derive(Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Condense an error body to "code: message", falling back to the raw text
pub(crate) fn error_summary(body: &str) -> String {
    match serde_json::from_str::<GraphErrorResponse>(body) {
        Ok(parsed) => format!("{}: {}", parsed.error.code, parsed.error.message),
        Err(_) => body.to_string(),
    }
}
