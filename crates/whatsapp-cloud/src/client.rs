//! Outbound send client for the Cloud API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::WhatsAppConfig;
use crate::error::WhatsAppError;

/// Retries after the initial attempt for transient failures.
const MAX_RETRIES: u32 = 3;
/// Fallback delay when a 429 carries no retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Provider id of the outbound message.
    pub provider_message_id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetails {
    message: String,
}

/// Supported outbound media kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Client for sending messages through the Cloud API.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    config: WhatsAppConfig,
}

impl WhatsAppClient {
    /// Create a client with a 10 second request timeout.
    pub fn new(config: WhatsAppConfig) -> Result<Self, WhatsAppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &WhatsAppConfig {
        &self.config
    }

    /// Send a text message. Returns the provider message id.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<SendOutcome, WhatsAppError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": body },
        });
        self.send_with_retry(&payload).await
    }

    /// Send a media message by public URL with an optional caption.
    pub async fn send_media(
        &self,
        to: &str,
        kind: MediaKind,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendOutcome, WhatsAppError> {
        let mut media = json!({ "link": url });
        if let Some(caption) = caption {
            media["caption"] = json!(caption);
        }
        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": kind.as_str(),
        });
        payload[kind.as_str()] = media;
        self.send_with_retry(&payload).await
    }

    /// POST the payload, retrying transient failures (network, 5xx, 429) up
    /// to the retry budget. 429 responses are delayed by the provider's
    /// `retry-after` header when present. Other 4xx responses surface
    /// immediately as `Rejected`.
    async fn send_with_retry(
        &self,
        payload: &serde_json::Value,
    ) -> Result<SendOutcome, WhatsAppError> {
        let url = self.config.messages_url();
        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!(attempt, "retrying WhatsApp send");
            }

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.access_token)
                .json(payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body: SendResponse = resp.json().await?;
                        let id = body
                            .messages
                            .into_iter()
                            .next()
                            .map(|m| m.id)
                            .unwrap_or_default();
                        return Ok(SendOutcome {
                            provider_message_id: id,
                        });
                    }

                    if status.as_u16() == 429 {
                        let delay = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or(DEFAULT_RETRY_AFTER);
                        warn!(?delay, "rate limited by provider");
                        last_error = "rate limited".to_string();
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let message = resp
                        .json::<ApiErrorBody>()
                        .await
                        .map(|b| b.error.message)
                        .unwrap_or_else(|_| format!("HTTP {status}"));

                    if status.is_server_error() {
                        last_error = message;
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1)))
                            .await;
                        continue;
                    }

                    return Err(WhatsAppError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(error = %e, "WhatsApp send transport failure");
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(WhatsAppError::DeliveryFailure {
            attempts: MAX_RETRIES + 1,
            message: last_error,
        })
    }
}

impl std::fmt::Debug for WhatsAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppClient")
            .field("phone_number_id", &self.config.phone_number_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_strings() {
        assert_eq!(MediaKind::Image.as_str(), "image");
        assert_eq!(MediaKind::Audio.as_str(), "audio");
        assert_eq!(MediaKind::Video.as_str(), "video");
    }

    #[test]
    fn rejected_and_delivery_failures_are_permanent() {
        assert!(WhatsAppError::Rejected {
            status: 400,
            message: "bad recipient".into()
        }
        .is_permanent());
        assert!(WhatsAppError::DeliveryFailure {
            attempts: 4,
            message: "timeout".into()
        }
        .is_permanent());
        assert!(!WhatsAppError::SignatureMismatch.is_permanent());
    }
}
