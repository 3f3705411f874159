//! Single-shot mail submission against the Graph sendMail endpoint

use crate::error::{SendError, SendResult};
use crate::message::{
    OutgoingMessage, MAX_ATTACHMENT_BYTES, MAX_REQUEST_BYTES, MAX_TOTAL_ATTACHMENT_BYTES,
};
use crate::types::{error_summary, SendMailRequest};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Graph API base URL
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Default bound on one send attempt, connection setup included
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of an accepted submission
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// HTTP status Graph answered with (202 on success)
    pub status: u16,
    /// Graph request-id header, for support correlation
    pub request_id: Option<String>,
    /// When the submission completed
    pub completed_at: DateTime<Utc>,
}

/// Submits one message per call to `POST /users/{sender}/sendMail`.
///
/// Performs no retries of its own: classification of the failure and any
/// retry policy belong to the caller. Every attempt returns within the
/// configured timeout; an attempt that outlives it is abandoned.
pub struct GraphMailSender {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    save_to_sent_items: bool,
}

impl Default for GraphMailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMailSender {
    /// Sender against the public Graph endpoint
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_BASE)
    }

    /// Sender against a non-default Graph endpoint (sovereign clouds, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: DEFAULT_SEND_TIMEOUT,
            save_to_sent_items: true,
        }
    }

    /// Override the per-attempt deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Control whether Graph copies sent messages to Sent Items
    pub fn save_to_sent_items(mut self, save: bool) -> Self {
        self.save_to_sent_items = save;
        self
    }

    /// Validate and submit a message as `sender` (falls back to the From
    /// address when `sender` is empty).
    pub async fn send(
        &self,
        access_token: &str,
        sender: &str,
        message: &OutgoingMessage,
    ) -> SendResult<DeliveryReceipt> {
        let mailbox = resolve_sender(sender, message)?;
        validate(message)?;

        let request = SendMailRequest::build(message, self.save_to_sent_items);
        self.submit(access_token, mailbox, &request).await
    }

    /// Send the connection probe: a short text message addressed back to the
    /// sender, not kept in Sent Items.
    pub async fn test_connection(
        &self,
        access_token: &str,
        sender: &str,
    ) -> SendResult<DeliveryReceipt> {
        if sender.trim().is_empty() {
            return Err(SendError::Malformed("sender email is not defined".to_string()));
        }

        let probe = OutgoingMessage::new(sender, "Test Connection").to(sender).text(
            "This is a test message to verify the Microsoft Graph API connection.",
        );
        let request = SendMailRequest::build(&probe, false);
        self.submit(access_token, sender, &request).await
    }

    async fn submit(
        &self,
        access_token: &str,
        mailbox: &str,
        request: &SendMailRequest,
    ) -> SendResult<DeliveryReceipt> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| SendError::Malformed(format!("unserializable message: {}", e)))?;
        if payload.len() > MAX_REQUEST_BYTES {
            return Err(SendError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_REQUEST_BYTES,
            });
        }

        let url = format!("{}/users/{}/sendMail", self.base_url, mailbox);
        debug!("Graph: sendMail as {} ({} bytes)", mailbox, payload.len());

        let attempt = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(access_token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload)
                .send()
                .await?;

            let status = response.status().as_u16();
            let request_id = response
                .headers()
                .get("request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = if response.status().is_success() {
                String::new()
            } else {
                response.text().await.unwrap_or_default()
            };
            Ok::<_, reqwest::Error>((status, request_id, body))
        };

        let (status, request_id, body) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) if e.is_timeout() => {
                warn!("Graph: sendMail timed out after {:?}", self.timeout);
                return Err(SendError::Timeout(self.timeout));
            }
            Ok(Err(e)) => return Err(SendError::RequestFailed(e)),
            Err(_) => {
                warn!("Graph: sendMail abandoned after {:?}", self.timeout);
                return Err(SendError::Timeout(self.timeout));
            }
        };

        match status {
            200..=299 => {
                info!("Graph: message accepted (status {})", status);
                Ok(DeliveryReceipt {
                    status,
                    request_id,
                    completed_at: Utc::now(),
                })
            }
            401 | 403 => Err(SendError::Unauthorized {
                status,
                detail: error_summary(&body),
            }),
            408 | 429 | 500..=599 => Err(SendError::Transient {
                status,
                detail: error_summary(&body),
            }),
            _ => Err(SendError::Rejected {
                status,
                detail: error_summary(&body),
            }),
        }
    }
}

fn resolve_sender<'a>(sender: &'a str, message: &'a OutgoingMessage) -> SendResult<&'a str> {
    let mailbox = if sender.trim().is_empty() {
        message.from.as_str()
    } else {
        sender
    };
    if mailbox.trim().is_empty() {
        return Err(SendError::Malformed("sender email is not defined".to_string()));
    }
    Ok(mailbox)
}

fn validate(message: &OutgoingMessage) -> SendResult<()> {
    if message.recipient_count() == 0 {
        return Err(SendError::Malformed("message has no recipients".to_string()));
    }

    let mut total = 0usize;
    for attachment in &message.attachments {
        if attachment.data.len() > MAX_ATTACHMENT_BYTES {
            return Err(SendError::AttachmentTooLarge {
                name: attachment.filename.clone(),
                size: attachment.data.len(),
                limit: MAX_ATTACHMENT_BYTES,
            });
        }
        total += attachment.data.len();
    }
    if total > MAX_TOTAL_ATTACHMENT_BYTES {
        return Err(SendError::PayloadTooLarge {
            size: total,
            limit: MAX_TOTAL_ATTACHMENT_BYTES,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread;

    /// Unroutable endpoint: any request against it fails with a transport
    /// error, so a typed validation error proves no network call happened
    const DEAD_ENDPOINT: &str = "http://127.0.0.1:1";

    struct MockGraphEndpoint {
        url: String,
        hits: Arc<AtomicUsize>,
        bodies: Arc<StdMutex<Vec<String>>>,
    }

    impl MockGraphEndpoint {
        /// Serve scripted (status, body, delay-ms) responses sequentially
        fn spawn(responses: Vec<(u16, &'static str, u64)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let hits = Arc::new(AtomicUsize::new(0));
            let bodies = Arc::new(StdMutex::new(Vec::new()));

            let thread_hits = hits.clone();
            let thread_bodies = bodies.clone();
            thread::spawn(move || {
                for (status, body, delay_ms) in responses {
                    let Ok((mut stream, _)) = listener.accept() else {
                        return;
                    };
                    let request_body = read_body(&mut stream);
                    thread_hits.fetch_add(1, Ordering::SeqCst);
                    thread_bodies.lock().unwrap().push(request_body);

                    if delay_ms > 0 {
                        thread::sleep(Duration::from_millis(delay_ms));
                    }

                    let reason = match status {
                        202 => "Accepted",
                        401 => "Unauthorized",
                        429 => "Too Many Requests",
                        _ => "Error",
                    };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nrequest-id: mock-request-id\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
            });

            Self { url, hits, bodies }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        fn last_body(&self) -> serde_json::Value {
            let bodies = self.bodies.lock().unwrap();
            serde_json::from_str(bodies.last().expect("no request captured")).unwrap()
        }
    }

    fn read_body(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        let mut content_length = 0usize;
        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            if line == "\r\n" || line == "\n" {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body).unwrap();
        }
        String::from_utf8_lossy(&body).into_owned()
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage::new("sender@example.com", "Quarterly report")
            .to("to@example.com")
            .html("<p>attached</p>")
    }

    #[tokio::test]
    async fn test_no_recipients_fails_before_network() {
        let sender = GraphMailSender::with_base_url(DEAD_ENDPOINT);
        let empty = OutgoingMessage::new("sender@example.com", "s");

        let err = sender.send("token", "sender@example.com", &empty).await.err().unwrap();
        assert!(matches!(err, SendError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_missing_sender_fails_before_network() {
        let sender = GraphMailSender::with_base_url(DEAD_ENDPOINT);
        let message = OutgoingMessage::new("", "s").to("to@example.com");

        let err = sender.send("token", "", &message).await.err().unwrap();
        assert!(matches!(err, SendError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_oversized_attachment_fails_before_network() {
        let sender = GraphMailSender::with_base_url(DEAD_ENDPOINT);
        let message = message().attachment(
            "huge.bin",
            "application/octet-stream",
            vec![0u8; MAX_ATTACHMENT_BYTES + 1],
        );

        let err = sender.send("token", "sender@example.com", &message).await.err().unwrap();
        match &err {
            SendError::AttachmentTooLarge { name, size, limit } => {
                assert_eq!(name, "huge.bin");
                assert_eq!(*size, MAX_ATTACHMENT_BYTES + 1);
                assert_eq!(*limit, MAX_ATTACHMENT_BYTES);
            }
            other => panic!("expected AttachmentTooLarge, got {:?}", other),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_total_attachment_ceiling_fails_before_network() {
        let sender = GraphMailSender::with_base_url(DEAD_ENDPOINT);
        let mut message = message();
        // Each chunk is inside the per-attachment limit; together they are not
        for i in 0..12 {
            message = message.attachment(
                format!("part-{}.bin", i),
                "application/octet-stream",
                vec![0u8; MAX_ATTACHMENT_BYTES],
            );
        }

        let err = sender.send("token", "sender@example.com", &message).await.err().unwrap();
        assert!(matches!(err, SendError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_accepted_submission_yields_receipt() {
        let endpoint = MockGraphEndpoint::spawn(vec![(202, "", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        let receipt = sender.send("token", "sender@example.com", &message()).await.unwrap();

        assert_eq!(receipt.status, 202);
        assert_eq!(receipt.request_id.as_deref(), Some("mock-request-id"));
        assert_eq!(endpoint.hits(), 1);

        let body = endpoint.last_body();
        assert_eq!(body["saveToSentItems"], true);
        assert_eq!(body["message"]["subject"], "Quarterly report");
        assert_eq!(body["message"]["body"]["contentType"], "HTML");
        assert_eq!(
            body["message"]["toRecipients"][0]["emailAddress"]["address"],
            "to@example.com"
        );
    }

    #[tokio::test]
    async fn test_attachments_and_bcc_reach_the_wire() {
        let endpoint = MockGraphEndpoint::spawn(vec![(202, "", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);
        let message = message()
            .bcc("hidden@example.com")
            .reply_to_message("<msg-1@example.com>")
            .attachment("a.txt", "text/plain", b"hello".to_vec());

        sender.send("token", "sender@example.com", &message).await.unwrap();

        let body = endpoint.last_body();
        assert_eq!(
            body["message"]["bccRecipients"][0]["emailAddress"]["address"],
            "hidden@example.com"
        );
        let attachment = &body["message"]["attachments"][0];
        assert_eq!(attachment["@odata.type"], "#microsoft.graph.fileAttachment");
        assert_eq!(attachment["name"], "a.txt");
        assert_eq!(attachment["contentBytes"], "aGVsbG8=");
        assert_eq!(
            body["message"]["internetMessageHeaders"][0]["name"],
            "In-Reply-To"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_surfaced_without_retry() {
        let unauthorized =
            r#"{"error":{"code":"InvalidAuthenticationToken","message":"Token expired"}}"#;
        // A second scripted response would absorb any internal retry
        let endpoint = MockGraphEndpoint::spawn(vec![(401, unauthorized, 0), (202, "", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        let err = sender.send("token", "sender@example.com", &message()).await.err().unwrap();

        match err {
            SendError::Unauthorized { status, detail } => {
                assert_eq!(status, 401);
                assert!(detail.contains("InvalidAuthenticationToken"));
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
        assert_eq!(endpoint.hits(), 1);
    }

    #[tokio::test]
    async fn test_throttling_is_transient() {
        let endpoint = MockGraphEndpoint::spawn(vec![(429, "slow down", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        let err = sender.send("token", "sender@example.com", &message()).await.err().unwrap();
        assert!(matches!(err, SendError::Transient { status: 429, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let endpoint = MockGraphEndpoint::spawn(vec![(503, "", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        let err = sender.send("token", "sender@example.com", &message()).await.err().unwrap();
        assert!(matches!(err, SendError::Transient { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_bad_request_is_rejected_not_retryable() {
        let bad = r#"{"error":{"code":"ErrorInvalidRecipients","message":"Bad address"}}"#;
        let endpoint = MockGraphEndpoint::spawn(vec![(400, bad, 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        let err = sender.send("token", "sender@example.com", &message()).await.err().unwrap();
        match &err {
            SendError::Rejected { status, detail } => {
                assert_eq!(*status, 400);
                assert!(detail.contains("ErrorInvalidRecipients"));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_endpoint_hits_the_deadline() {
        let endpoint = MockGraphEndpoint::spawn(vec![(202, "", 2_000)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url)
            .timeout(Duration::from_millis(100));

        let err = sender.send("token", "sender@example.com", &message()).await.err().unwrap();
        assert!(matches!(err, SendError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_probe_goes_back_to_sender() {
        let endpoint = MockGraphEndpoint::spawn(vec![(202, "", 0)]);
        let sender = GraphMailSender::with_base_url(&endpoint.url);

        sender.test_connection("token", "sender@example.com").await.unwrap();

        let body = endpoint.last_body();
        assert_eq!(body["saveToSentItems"], false);
        assert_eq!(body["message"]["subject"], "Test Connection");
        assert_eq!(
            body["message"]["toRecipients"][0]["emailAddress"]["address"],
            "sender@example.com"
        );
    }
}
