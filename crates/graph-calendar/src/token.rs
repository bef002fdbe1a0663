//! OAuth client-credentials token cache.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CalendarConfig;
use crate::error::CalendarError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Caches the app-only access token and refreshes it shortly before expiry.
#[derive(Clone)]
pub struct TokenProvider {
    http: Client,
    config: CalendarConfig,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl TokenProvider {
    pub fn new(http: Client, config: CalendarConfig) -> Self {
        Self {
            http,
            config,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Get a valid bearer token, fetching a fresh one when the cached token
    /// is absent or within a minute of expiry.
    pub async fn bearer(&self) -> Result<String, CalendarError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("fetching fresh calendar access token");
        let response = self
            .http
            .post(self.config.token_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", "https://graph.microsoft.com/.default"),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!("token endpoint {status}: {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let fresh = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        *cached = Some(fresh);

        Ok(token.access_token)
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("tenant_id", &self.config.tenant_id)
            .finish()
    }
}
