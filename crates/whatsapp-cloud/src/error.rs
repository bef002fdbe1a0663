//! Error types for the WhatsApp Cloud API client.

use thiserror::Error;

/// Errors that can occur when talking to the Cloud API.
#[derive(Debug, Error)]
pub enum WhatsAppError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Webhook signature did not match the app secret.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Signature header was absent or malformed.
    #[error("invalid signature header: {0}")]
    InvalidSignature(String),

    /// Provider rejected the request with a non-retriable status.
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The retry budget was exhausted without a successful send.
    #[error("delivery failed after {attempts} attempts: {message}")]
    DeliveryFailure { attempts: u32, message: String },
}

impl WhatsAppError {
    /// True for errors the orchestrator records as a permanent delivery
    /// failure on the message row.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            WhatsAppError::Rejected { .. } | WhatsAppError::DeliveryFailure { .. }
        )
    }
}
