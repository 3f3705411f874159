//! Microsoft Graph mail submission for mailbridge
//!
//! Builds and submits one sendMail request per call: local validation of
//! recipients and attachment sizes, base64 fileAttachment encoding, and a
//! hard per-attempt deadline so a hung HTTP exchange can never block the
//! caller. Retry policy is deliberately left to the caller.

mod error;
mod message;
mod sender;
mod types;

pub use error::{SendError, SendResult};
pub use message::{
    OutgoingAttachment, OutgoingMessage, MAX_ATTACHMENT_BYTES, MAX_REQUEST_BYTES,
    MAX_TOTAL_ATTACHMENT_BYTES,
};
pub use sender::{DeliveryReceipt, GraphMailSender, DEFAULT_SEND_TIMEOUT, GRAPH_BASE};
