//! Configuration for the Graph calendar client.

use std::env;

use chrono_tz::Tz;

/// Configuration for the Graph API connection and scheduling rules.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    /// Graph API base URL.
    pub base_url: String,
    /// OAuth token endpoint base (login host).
    pub login_url: String,
    /// Azure AD tenant id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret for the client-credentials grant.
    pub client_secret: String,
    /// Calendar owner the app schedules on behalf of.
    pub user_email: String,
    /// Timezone the working window is expressed in.
    pub timezone: Tz,
    /// Working window start hour (local).
    pub work_start_hour: u32,
    /// Working window end hour (local, exclusive).
    pub work_end_hour: u32,
}

impl CalendarConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `CALENDAR_TENANT_ID` | Azure AD tenant (required) | |
    /// | `CALENDAR_CLIENT_ID` | App client id (required) | |
    /// | `CALENDAR_CLIENT_SECRET` | App secret (required) | |
    /// | `CALENDAR_USER_EMAIL` | Calendar owner (required) | |
    /// | `TIMEZONE` | IANA zone for the working window | `America/Bogota` |
    /// | `CALENDAR_API_URL` | Graph base URL | `https://graph.microsoft.com/v1.0` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let timezone = env::var("TIMEZONE")
            .unwrap_or_else(|_| "America/Bogota".to_string())
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone)?;

        Ok(Self {
            base_url: env::var("CALENDAR_API_URL")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".to_string()),
            login_url: env::var("CALENDAR_LOGIN_URL")
                .unwrap_or_else(|_| "https://login.microsoftonline.com".to_string()),
            tenant_id: require("CALENDAR_TENANT_ID")?,
            client_id: require("CALENDAR_CLIENT_ID")?,
            client_secret: require("CALENDAR_CLIENT_SECRET")?,
            user_email: require("CALENDAR_USER_EMAIL")?,
            timezone,
            work_start_hour: 9,
            work_end_hour: 18,
        })
    }

    /// Token endpoint for the tenant.
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_url, self.tenant_id)
    }

    /// Base URL for the owner's calendar.
    pub fn calendar_url(&self) -> String {
        format!("{}/users/{}", self.base_url, self.user_email)
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

    #[error("TIMEZONE is not a valid IANA zone name")]
    InvalidTimezone,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CalendarConfig {
        CalendarConfig {
            base_url: "https://graph.microsoft.com/v1.0".into(),
            login_url: "https://login.microsoftonline.com".into(),
            tenant_id: "tenant-1".into(),
            client_id: "client-1".into(),
            client_secret: "secret".into(),
            user_email: "sales@example.com".into(),
            timezone: chrono_tz::America::Bogota,
            work_start_hour: 9,
            work_end_hour: 18,
        }
    }

    #[test]
    fn url_builders() {
        let c = config();
        assert_eq!(
            c.token_url(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(
            c.calendar_url(),
            "https://graph.microsoft.com/v1.0/users/sales@example.com"
        );
    }
}
