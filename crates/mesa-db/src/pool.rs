//! Database connection pool management.
//!
//! Pool tuning comes from the environment (`MESA_DB_*` variables) with
//! conservative defaults. Unset variables keep the defaults; malformed
//! values are a configuration error surfaced before any connection is
//! attempted.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use mesa_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection-acquire timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Pool configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool tuning from `MESA_DB_MAX_CONNECTIONS`, `MESA_DB_MIN_CONNECTIONS`,
    /// `MESA_DB_CONNECT_TIMEOUT_SECS`, `MESA_DB_IDLE_TIMEOUT_SECS`, and
    /// `MESA_DB_MAX_LIFETIME_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PoolConfig::default();
        if let Some(n) = parse_env::<u32, _>(&lookup, "MESA_DB_MAX_CONNECTIONS")? {
            config = config.max_connections(n);
        }
        if let Some(n) = parse_env::<u32, _>(&lookup, "MESA_DB_MIN_CONNECTIONS")? {
            config = config.min_connections(n);
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, "MESA_DB_CONNECT_TIMEOUT_SECS")? {
            config = config.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, "MESA_DB_IDLE_TIMEOUT_SECS")? {
            config = config.idle_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64, _>(&lookup, "MESA_DB_MAX_LIFETIME_SECS")? {
            config = config.max_lifetime(Some(Duration::from_secs(secs)));
        }
        Ok(config)
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection-acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }
}

fn parse_env<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::Config(format!(
                "{} must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
    }
}

/// Create a connection pool with explicit configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "creating database pool"
    );

    let started = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    let elapsed = started.elapsed();
    if elapsed > Duration::from_secs(5) {
        warn!(
            duration_ms = elapsed.as_millis() as u64,
            "slow database connection"
        );
    } else {
        info!(
            duration_ms = elapsed.as_millis() as u64,
            "database pool ready"
        );
    }
    Ok(pool)
}
