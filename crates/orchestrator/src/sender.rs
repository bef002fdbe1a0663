//! Reply dispatch seam.

use async_trait::async_trait;

/// Outcome classification for a failed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Worth retrying later; the turn keeps the message unflagged.
    Transient(String),
    /// The retry budget is spent or the provider rejected the message; the
    /// message row gets a delivery-error flag.
    Permanent(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Transient(m) => write!(f, "transient send failure: {m}"),
            SendError::Permanent(m) => write!(f, "permanent send failure: {m}"),
        }
    }
}

/// Sends assistant replies back to the user's platform.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send a text reply; returns the provider message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, SendError>;
}

/// WhatsApp Cloud API sender.
pub struct WhatsAppSender {
    client: whatsapp_cloud::WhatsAppClient,
}

impl WhatsAppSender {
    pub fn new(client: whatsapp_cloud::WhatsAppClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplySender for WhatsAppSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, SendError> {
        match self.client.send_text(to, body).await {
            Ok(outcome) => Ok(outcome.provider_message_id),
            Err(e) if e.is_permanent() => Err(SendError::Permanent(e.to_string())),
            Err(e) => Err(SendError::Transient(e.to_string())),
        }
    }
}

/// Discards all sends; used when the platform is the web widget (delivery
/// happens through the real-time hub) and in tests.
#[derive(Debug, Clone, Default)]
pub struct NoOpSender;

#[async_trait]
impl ReplySender for NoOpSender {
    async fn send_text(&self, _to: &str, _body: &str) -> Result<String, SendError> {
        Ok(String::new())
    }
}

/// Records sends for assertions; optionally fails every send.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: tokio::sync::Mutex<Vec<(String, String)>>,
    fail_with: Option<SendError>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail with the given error.
    pub fn failing(error: SendError) -> Self {
        Self {
            sent: tokio::sync::Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    /// `(recipient, body)` pairs attempted so far.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ReplySender for RecordingSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, SendError> {
        self.sent
            .lock()
            .await
            .push((to.to_string(), body.to_string()));
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(format!("wamid.test.{}", body.len())),
        }
    }
}
