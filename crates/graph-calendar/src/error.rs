//! Error types for the Graph calendar client.

use thiserror::Error;

/// Errors that can occur when talking to the calendar provider.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token acquisition failed.
    #[error("auth failed: {0}")]
    Auth(String),

    /// Provider rejected the request with a non-retriable status.
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Transient failures exhausted the retry budget.
    #[error("calendar unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    /// Caller passed an unusable time or window.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CalendarError {
    /// True for errors retries cannot fix; the orchestrator turns these into
    /// a user-facing "couldn't schedule" message.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CalendarError::Rejected { .. }
                | CalendarError::Auth(_)
                | CalendarError::InvalidRequest(_)
                | CalendarError::Unavailable { .. }
        )
    }
}
