use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Address the HTTP server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    /// Days between invoice creation and its due date
    #[serde(default = "default_invoice_due_days")]
    pub invoice_due_days: i64,

    /// How many days ahead of the due date reminders go out
    #[serde(default = "default_reminder_lead_days")]
    pub reminder_lead_days: i64,

    /// Notifications older than this are purged by the weekly job
    #[serde(default = "default_retention_days")]
    pub notification_retention_days: i64,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Comma separated list of allowed front-end origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_invoice_due_days() -> i64 {
    15
}

fn default_reminder_lead_days() -> i64 {
    3
}

fn default_retention_days() -> i64 {
    90
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_cors_origins() -> String {
    "http://localhost:5173,http://localhost:3000".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function will:
    /// 1. Load variables from .env file if it exists
    /// 2. Deserialize environment variables into Config struct
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv().ok();

        // Parse environment variables into Config struct
        let config = envy::from_env::<Config>()?;

        Ok(config)
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    // Ensure .env file is loaded
    dotenv().ok();

    // Load the configuration
    let config = Config::load()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter::<_, Config>(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .expect("config should deserialize")
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = from_pairs(&[("DATABASE_URL", "postgres://localhost/bluemoon")]);

        assert_eq!(config.database_url(), "postgres://localhost/bluemoon");
        assert_eq!(config.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.invoice_due_days, 15);
        assert_eq!(config.reminder_lead_days, 3);
        assert_eq!(config.notification_retention_days, 90);
        assert!(config.smtp_host.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let result = envy::from_iter::<_, Config>(vec![(
            "BIND_ADDR".to_string(),
            "127.0.0.1:9000".to_string(),
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/bluemoon"),
            ("CORS_ORIGINS", " http://a.test , ,http://b.test"),
        ]);

        assert_eq!(config.cors_origins(), vec!["http://a.test", "http://b.test"]);
    }
}
