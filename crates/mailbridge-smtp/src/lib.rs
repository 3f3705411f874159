//! SMTP fallback transport for mailbridge
//!
//! Hosts that keep a classic relay configured can route individual messages
//! here instead of the Graph API; the choice is made per message by the
//! caller, never silently inside the Graph path.

mod client;
mod error;

pub use client::{build_mime_message, SmtpClient};
pub use error::{SmtpError, SmtpResult};
