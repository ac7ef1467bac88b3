//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

/// Which analyzer the engine runs on freshly claimed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    None,
    Placeholder,
}

impl FromStr for AnalyzerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(AnalyzerKind::None),
            "placeholder" => Ok(AnalyzerKind::Placeholder),
            other => Err(Error::Config(format!(
                "ANALYZER must be 'none' or 'placeholder', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub store_collection: String,
    pub downstream_channel: String,
    pub project_id: String,
    pub trigger_queue: Option<String>,
    pub listen_addr: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub store_timeout: Duration,
    pub publish_timeout: Duration,
    pub publish_max_attempts: u32,
    pub publish_backoff: Duration,
    pub analysis_timeout: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_stale_after: Duration,
    pub analyzer: AnalyzerKind,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_collection = identifier(&lookup, "STORE_COLLECTION")?;
        let downstream_channel = identifier(&lookup, "DOWNSTREAM_CHANNEL")?;
        let trigger_queue = match lookup("TRIGGER_QUEUE").filter(|v| !v.is_empty()) {
            Some(queue) => Some(validate_identifier("TRIGGER_QUEUE", queue)?),
            None => None,
        };

        let publish_max_attempts = parsed(&lookup, "PUBLISH_MAX_ATTEMPTS", 3u32)?;
        if publish_max_attempts == 0 {
            return Err(Error::Config(
                "PUBLISH_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: SecretString::from(required(&lookup, "DATABASE_URL")?),
            store_collection,
            downstream_channel,
            project_id: required(&lookup, "PROJECT_ID")?,
            trigger_queue,
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|v| !v.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            store_timeout: Duration::from_millis(parsed(&lookup, "STORE_TIMEOUT_MS", 5000)?),
            publish_timeout: Duration::from_millis(parsed(&lookup, "PUBLISH_TIMEOUT_MS", 5000)?),
            publish_max_attempts,
            publish_backoff: Duration::from_millis(parsed(&lookup, "PUBLISH_BACKOFF_MS", 200)?),
            analysis_timeout: Duration::from_millis(parsed(
                &lookup,
                "ANALYSIS_TIMEOUT_MS",
                10_000,
            )?),
            reconcile_interval: Duration::from_secs(parsed(
                &lookup,
                "RECONCILE_INTERVAL_SECS",
                60,
            )?),
            reconcile_stale_after: Duration::from_secs(parsed(
                &lookup,
                "RECONCILE_STALE_AFTER_SECS",
                300,
            )?),
            analyzer: match lookup("ANALYZER") {
                Some(kind) => kind.parse()?,
                None => AnalyzerKind::None,
            },
        })
    }

    /// The pull transport cannot run without a queue to read from.
    pub fn require_trigger_queue(&self) -> Result<&str> {
        self.trigger_queue.as_deref().ok_or_else(|| {
            Error::Config("TRIGGER_QUEUE is required for the pull transport".to_string())
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn identifier<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    validate_identifier(name, required(lookup, name)?)
}

/// Collection and queue names end up in SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str, value: String) -> Result<String> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{name} must match [A-Za-z_][A-Za-z0-9_]*, got '{value}'"
        )))
    }
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}
