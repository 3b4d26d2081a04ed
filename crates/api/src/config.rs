//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::RetryConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL state store; in-memory when unset
/// - `SAGA_STUCK_THRESHOLD_MINUTES`: age after which an unfinished saga is reported (default: `30`)
/// - `SAGA_SWEEP_INTERVAL_SECS`: maintenance interval (default: `60`)
/// - `AUDIT_RETENTION_HOURS`: how long audit logs are kept (default: `24`)
/// - `SAGA_EXECUTION_RETENTION_HOURS`: how long finished execution records
///   are kept in the state store (default: `168`, `0` keeps them forever)
/// - `RETRY_MAX_ATTEMPTS`, `RETRY_INITIAL_DELAY_MS`, `RETRY_MAX_DELAY_MS`,
///   `RETRY_ATTEMPT_TIMEOUT_MS`: retry executor settings
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub stuck_threshold: Duration,
    pub sweep_interval: Duration,
    pub audit_retention: Duration,
    pub execution_retention: Option<Duration>,
    pub retry: RetryConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let retry = RetryConfig {
            max_attempts: parse("RETRY_MAX_ATTEMPTS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.retry.max_attempts),
            initial_delay: parse("RETRY_INITIAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_delay),
            max_delay: parse("RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_delay),
            attempt_timeout: parse("RETRY_ATTEMPT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.attempt_timeout),
            ..defaults.retry
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            stuck_threshold: parse("SAGA_STUCK_THRESHOLD_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.stuck_threshold),
            sweep_interval: parse("SAGA_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            audit_retention: parse("AUDIT_RETENTION_HOURS")
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.audit_retention),
            execution_retention: match parse("SAGA_EXECUTION_RETENTION_HOURS") {
                Some(0) => None,
                Some(h) => Some(Duration::from_secs(h * 3600)),
                None => defaults.execution_retention,
            },
            retry,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            stuck_threshold: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            audit_retention: Duration::from_secs(24 * 3600),
            execution_retention: Some(Duration::from_secs(7 * 24 * 3600)),
            retry: RetryConfig::default(),
        }
    }
}
