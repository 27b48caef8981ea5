//! Database configuration
//!
//! Connection string plus pool knobs. Values come from code, a deserialized
//! config file, or the environment via [`DatabaseConfig::from_env`].

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{DbError, DbResult};

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600),  // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Everything needed to build a [`PgClient`](crate::PgClient)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Create the pool without opening a connection up front
    #[serde(default)]
    pub lazy: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolConfig::default(),
            lazy: false,
        }
    }

    /// Load from `DATABASE_URL` and the optional `DATABASE_*` pool variables
    pub fn from_env() -> DbResult<Self> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| DbError::Configuration("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(url);
        if let Some(max) = env_parse::<u32>("DATABASE_MAX_CONNECTIONS")? {
            config.pool.max_connections = max;
        }
        if let Some(min) = env_parse::<u32>("DATABASE_MIN_CONNECTIONS")? {
            config.pool.min_connections = min;
        }
        if let Some(timeout) = env_parse::<u64>("DATABASE_ACQUIRE_TIMEOUT")? {
            config.pool.acquire_timeout = timeout;
        }
        if let Some(lazy) = env_parse::<bool>("DATABASE_LAZY")? {
            config.lazy = lazy;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the pool knobs. The URL itself is checked when connecting.
    pub fn validate(&self) -> DbResult<()> {
        if self.pool.max_connections == 0 {
            return Err(DbError::Configuration(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(DbError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.pool.max_connections = max_connections;
        self
    }

    pub fn with_min_connections(mut self, min_connections: u32) -> Self {
        self.pool.min_connections = min_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout_seconds: u64) -> Self {
        self.pool.acquire_timeout = timeout_seconds;
        self
    }

    pub fn with_idle_timeout(mut self, timeout_seconds: Option<u64>) -> Self {
        self.pool.idle_timeout = timeout_seconds;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime_seconds: Option<u64>) -> Self {
        self.pool.max_lifetime = lifetime_seconds;
        self
    }

    pub fn with_test_before_acquire(mut self, enabled: bool) -> Self {
        self.pool.test_before_acquire = enabled;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Host, port and database of the URL, for logging without credentials
    /// or query parameters
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => format!(
                "{}:{}{}",
                parsed.host_str().unwrap_or("unknown"),
                parsed.port().unwrap_or(5432),
                parsed.path()
            ),
            Err(_) => "unknown".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> DbResult<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            DbError::Configuration(format!("invalid value for {}: {:?}", key, raw))
        }),
        Err(_) => Ok(None),
    }
}
