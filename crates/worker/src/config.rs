//! Worker configuration loaded from environment variables.

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `AMQP_URL`: broker address (default: `"amqp://localhost:5672"`)
/// - `DATABASE_URL`: Postgres outbox/idempotency store; in-memory when unset
/// - `PREFETCH`: per-consumer prefetch count (default: `10`)
/// - `OUTBOX_POLL_MS`: outbox relay polling interval (default: `1000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub amqp_url: String,
    pub database_url: Option<String>,
    pub prefetch: u16,
    pub outbox_poll_ms: u64,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            amqp_url: std::env::var("AMQP_URL")
                .unwrap_or_else(|_| "amqp://localhost:5672".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            prefetch: std::env::var("PREFETCH")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10),
            outbox_poll_ms: std::env::var("OUTBOX_POLL_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            amqp_url: "amqp://localhost:5672".to_string(),
            database_url: None,
            prefetch: 10,
            outbox_poll_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}
