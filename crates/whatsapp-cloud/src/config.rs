//! Configuration for the WhatsApp Cloud API client.

use std::env;

/// Configuration for connecting to the Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Graph API base URL.
    pub base_url: String,
    /// Bearer token for the business account.
    pub access_token: String,
    /// App secret used for webhook signature verification.
    pub app_secret: String,
    /// The business phone number id that sends are issued from.
    pub phone_number_id: String,
    /// Token echoed during the webhook subscription handshake.
    pub verify_token: String,
}

impl WhatsAppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `MESSAGING_ACCESS_TOKEN` | Cloud API bearer token (required) |
    /// | `MESSAGING_APP_SECRET` | App secret for signature checks (required) |
    /// | `MESSAGING_PHONE_NUMBER_ID` | Sending phone number id (required) |
    /// | `WEBHOOK_VERIFY_TOKEN` | Subscription handshake token (required) |
    /// | `MESSAGING_API_URL` | Base URL override (default Graph v19) |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env::var("MESSAGING_API_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string()),
            access_token: require("MESSAGING_ACCESS_TOKEN")?,
            app_secret: require("MESSAGING_APP_SECRET")?,
            phone_number_id: require("MESSAGING_PHONE_NUMBER_ID")?,
            verify_token: require("WEBHOOK_VERIFY_TOKEN")?,
        })
    }

    /// The messages endpoint for the configured phone number.
    pub fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_url_includes_phone_number_id() {
        let config = WhatsAppConfig {
            base_url: "https://graph.facebook.com/v19.0".into(),
            access_token: "token".into(),
            app_secret: "secret".into(),
            phone_number_id: "1055512345".into(),
            verify_token: "verify".into(),
        };
        assert_eq!(
            config.messages_url(),
            "https://graph.facebook.com/v19.0/1055512345/messages"
        );
    }
}
