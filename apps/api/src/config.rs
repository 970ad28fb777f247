use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::apply::fields::LogicalField;

/// Where application tasks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Postgres,
    /// Non-durable; tasks are lost on restart.
    Memory,
}

impl FromStr for QueueBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(QueueBackend::Postgres),
            "memory" => Ok(QueueBackend::Memory),
            other => bail!("QUEUE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdzunaCredentials {
    pub app_id: String,
    pub api_key: String,
    pub country: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub queue_backend: QueueBackend,
    pub queue_consumers: usize,
    pub queue_lease: Duration,
    pub queue_poll_interval: Duration,
    pub field_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Site-specific patterns appended after the built-in ones, per field.
    pub extra_selectors: Vec<(LogicalField, Vec<String>)>,
    pub chrome_executable: Option<PathBuf>,
    pub browser_headless: bool,
    pub jsearch_api_key: Option<String>,
    pub adzuna: Option<AdzunaCredentials>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let queue_backend = match var("QUEUE_BACKEND") {
            Some(value) => value.parse()?,
            None => QueueBackend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if queue_backend == QueueBackend::Postgres && database_url.is_none() {
            bail!("Required environment variable 'DATABASE_URL' is not set");
        }

        let adzuna = match (var("ADZUNA_APP_ID"), var("ADZUNA_API_KEY")) {
            (Some(app_id), Some(api_key)) => Some(AdzunaCredentials {
                app_id,
                api_key,
                country: var("ADZUNA_COUNTRY").unwrap_or_else(|| "us".to_string()),
            }),
            _ => None,
        };

        let queue_lease = Duration::from_secs(parse_or(&var, "QUEUE_LEASE_SECS", 300)?);
        if queue_lease.is_zero() {
            bail!("QUEUE_LEASE_SECS must be at least 1");
        }

        Ok(Config {
            database_url,
            queue_backend,
            queue_consumers: parse_or(&var, "QUEUE_CONSUMERS", 1usize)?.max(1),
            queue_lease,
            queue_poll_interval: Duration::from_millis(parse_or(
                &var,
                "QUEUE_POLL_INTERVAL_MS",
                1000,
            )?),
            field_timeout: Duration::from_secs(parse_or(&var, "APPLY_FIELD_TIMEOUT_SECS", 5)?),
            navigation_timeout: Duration::from_secs(parse_or(
                &var,
                "APPLY_NAVIGATION_TIMEOUT_SECS",
                30,
            )?),
            extra_selectors: extra_selectors(&var),
            chrome_executable: var("CHROME_EXECUTABLE").map(PathBuf::from),
            browser_headless: parse_or(&var, "BROWSER_HEADLESS", true)?,
            jsearch_api_key: var("JSEARCH_API_KEY"),
            adzuna,
            port: parse_or(&var, "PORT", 8080u16)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// `APPLY_EXTRA_SELECTORS_<FIELD>`: `;`-separated, since CSS selectors use commas.
fn extra_selectors(var: &impl Fn(&str) -> Option<String>) -> Vec<(LogicalField, Vec<String>)> {
    LogicalField::FILL_ORDER
        .iter()
        .filter_map(|field| {
            let key = format!("APPLY_EXTRA_SELECTORS_{}", field.as_str().to_uppercase());
            let patterns: Vec<String> = var(&key)?
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            (!patterns.is_empty()).then_some((*field, patterns))
        })
        .collect()
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
