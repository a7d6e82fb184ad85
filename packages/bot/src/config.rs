use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::common::SecretString;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Document source
    pub fia_url: String,
    pub scrape_interval: Duration,
    pub documents_to_fetch: usize,
    pub max_concurrent_processing: usize,
    pub work_dir: String,

    // Storage
    pub db: DatabaseConfig,

    // Threads
    pub threads_access_token: SecretString,
    pub threads_user_id: String,
    pub threads_client_id: String,
    pub threads_client_secret: SecretString,
    pub threads_redirect_uri: String,
    pub threads_api_url: String,
    pub token_refresh_interval: Duration,

    // Summaries
    pub summary_api_key: SecretString,
    pub summary_api_url: String,
    pub summary_model: String,
    pub summary_timeout: Duration,

    // Rendering, image hosting, link shortening
    pub conversion_service_url: String,
    pub picsur_api: SecretString,
    pub picsur_url: String,
    pub shortener_api_key: SecretString,
    pub shortener_url: String,

    // Operations
    pub log_level: String,
    pub log_format: LogFormat,
    pub health_port: Option<u16>,
}

/// Postgres connection parameters
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub name: String,
    pub ssl_mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} is required"));
        let parsed = |key: &str, default: u64| -> Result<u64> {
            match var(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a valid number")),
                None => Ok(default),
            }
        };

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };

        let health_port = match var("HEALTH_PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .context("HEALTH_PORT must be a valid port")?,
            ),
            None => None,
        };

        Ok(Self {
            fia_url: required("FIA_URL")?,
            scrape_interval: Duration::from_secs(parsed("SCRAPE_INTERVAL", 30)?),
            documents_to_fetch: parsed("DOCUMENTS_TO_FETCH", 8)? as usize,
            max_concurrent_processing: (parsed("MAX_CONCURRENT_PROCESSING", 5)? as usize).max(1),
            work_dir: var("WORK_DIR").unwrap_or_else(|| "temp".to_string()),

            db: DatabaseConfig {
                host: required("DB_HOST")?,
                port: parsed("DB_PORT", 5432)?
                    .try_into()
                    .context("DB_PORT must be a valid port")?,
                user: required("DB_USER")?,
                password: required("DB_PASSWORD")?.into(),
                name: required("DB_NAME")?,
                ssl_mode: var("DB_SSL_MODE").unwrap_or_else(|| "disable".to_string()),
            },

            threads_access_token: required("THREADS_ACCESS_TOKEN")?.into(),
            threads_user_id: var("THREADS_USER_ID").unwrap_or_else(|| "me".to_string()),
            threads_client_id: required("THREADS_CLIENT_ID")?,
            threads_client_secret: required("THREADS_CLIENT_SECRET")?.into(),
            threads_redirect_uri: required("THREADS_REDIRECT_URI")?,
            threads_api_url: var("THREADS_API_URL")
                .unwrap_or_else(|| "https://graph.threads.net".to_string()),
            token_refresh_interval: Duration::from_secs(
                parsed("TOKEN_REFRESH_DAYS", 45)? * 24 * 60 * 60,
            ),

            summary_api_key: required("SUMMARY_API_KEY")?.into(),
            summary_api_url: var("SUMMARY_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            summary_model: var("SUMMARY_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            summary_timeout: Duration::from_secs(parsed("SUMMARY_TIMEOUT_SECS", 60)?),

            conversion_service_url: required("CONVERSION_SERVICE_URL")?,
            picsur_api: required("PICSUR_API")?.into(),
            picsur_url: required("PICSUR_URL")?,
            shortener_api_key: required("SHORTENER_API_KEY")?.into(),
            shortener_url: required("SHORTENER_URL")?,

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            health_port,
        })
    }
}

/// The subset of configuration the OAuth helper commands need.
#[derive(Debug, Clone)]
pub struct ThreadsAppConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub api_url: String,
}

impl ThreadsAppConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} is required"));

        Ok(Self {
            client_id: required("THREADS_CLIENT_ID")?,
            client_secret: required("THREADS_CLIENT_SECRET")?.into(),
            redirect_uri: required("THREADS_REDIRECT_URI")?,
            api_url: var("THREADS_API_URL")
                .unwrap_or_else(|| "https://graph.threads.net".to_string()),
        })
    }
}

impl DatabaseConfig {
    /// sqlx connect options for these parameters
    pub fn connect_options(&self) -> Result<sqlx::postgres::PgConnectOptions> {
        let ssl_mode = self
            .ssl_mode
            .parse::<sqlx::postgres::PgSslMode>()
            .with_context(|| format!("DB_SSL_MODE '{}' is not a valid ssl mode", self.ssl_mode))?;

        Ok(sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose())
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }
}
