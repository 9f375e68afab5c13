use std::time::Duration;

use crate::background::queue_scanner::DEFAULT_SCAN_INTERVAL;
use crate::engine::dispatch::DEFAULT_SHARDS;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. `DATABASE_URL`
/// is read separately by the binary since it is the only required value.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long to wait for background tasks after shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Upper bound on pooled database connections (default: `20`).
    pub db_max_connections: u32,
    /// Period of the background queue scanner in milliseconds (default: `1000`).
    pub scan_interval_ms: u64,
    /// Number of dispatch table shards (default: `16`).
    pub dispatch_shards: usize,
    /// Ensure at least this many accounts exist at startup (default: `0`).
    pub seed_accounts: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            db_max_connections: tally_db::DEFAULT_MAX_CONNECTIONS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL.as_millis() as u64,
            dispatch_shards: DEFAULT_SHARDS,
            seed_accounts: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default   |
    /// |-------------------------|-----------|
    /// | `HOST`                  | `0.0.0.0` |
    /// | `PORT`                  | `3000`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`      |
    /// | `DB_MAX_CONNECTIONS`    | `20`      |
    /// | `SCAN_INTERVAL_MS`      | `1000`    |
    /// | `DISPATCH_SHARDS`       | `16`      |
    /// | `SEED_ACCOUNTS`         | `0`       |
    ///
    /// Panics on unparseable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let port: u16 = env_parse("PORT", defaults.port);
        let request_timeout_secs: u64 =
            env_parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);
        let shutdown_timeout_secs: u64 =
            env_parse("SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout_secs);
        let db_max_connections: u32 = env_parse("DB_MAX_CONNECTIONS", defaults.db_max_connections);
        let scan_interval_ms: u64 = env_parse("SCAN_INTERVAL_MS", defaults.scan_interval_ms);
        let dispatch_shards: usize = env_parse("DISPATCH_SHARDS", defaults.dispatch_shards);
        let seed_accounts: i64 = env_parse("SEED_ACCOUNTS", defaults.seed_accounts);

        assert!(db_max_connections > 0, "DB_MAX_CONNECTIONS must be positive");
        assert!(scan_interval_ms > 0, "SCAN_INTERVAL_MS must be positive");
        assert!(dispatch_shards > 0, "DISPATCH_SHARDS must be positive");

        Self {
            host,
            port,
            request_timeout_secs,
            shutdown_timeout_secs,
            db_max_connections,
            scan_interval_ms,
            dispatch_shards,
            seed_accounts,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
