//! Pool configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{PoolError, Result};

/// Default upper bound on live connections per endpoint.
pub const DEFAULT_MAX_POOL_SIZE: usize = 5;

/// Default lower bound on live connections per endpoint.
pub const DEFAULT_MIN_POOL_SIZE: usize = 1;

/// Default total deadline for a checkout.
pub const DEFAULT_WAIT_QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Identity of a server endpoint.
///
/// Immutable for the lifetime of the pool that targets it; carried on
/// lifecycle events and timeout errors so subscribers can attribute them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 27017).
    pub port: u16,
}

impl ServerAddress {
    /// Create an address from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// use docdb_driver_pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .min_pool_size(2)
///     .max_pool_size(20)
///     .wait_queue_timeout(Duration::from_millis(500))
///     .max_idle_time(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live connections (idle + checked out).
    pub max_pool_size: usize,

    /// Lower bound on live connections; enforced at construction and after
    /// a full disconnect.
    pub min_pool_size: usize,

    /// Total deadline for a checkout. Zero means a single non-blocking
    /// attempt.
    pub wait_queue_timeout: Duration,

    /// Idle connections older than this are reaped. `None` disables idle
    /// reaping entirely.
    pub max_idle_time: Option<Duration>,

    /// Enable invariant checks. Violations panic. Intended for tests;
    /// leave off in production.
    pub lint: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_pool_size: DEFAULT_MIN_POOL_SIZE,
            wait_queue_timeout: DEFAULT_WAIT_QUEUE_TIMEOUT,
            max_idle_time: None,
            lint: false,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_pool_size(mut self, size: usize) -> Self {
        self.min_pool_size = size;
        self
    }

    /// Set the checkout deadline.
    #[must_use]
    pub fn wait_queue_timeout(mut self, timeout: Duration) -> Self {
        self.wait_queue_timeout = timeout;
        self
    }

    /// Set the idle expiry threshold, enabling idle reaping.
    #[must_use]
    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = Some(max_idle_time);
        self
    }

    /// Enable or disable invariant checks.
    #[must_use]
    pub fn lint(mut self, enabled: bool) -> Self {
        self.lint = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// Fails when `min_pool_size` exceeds `max_pool_size`.
    pub fn validate(&self) -> Result<()> {
        if self.min_pool_size > self.max_pool_size {
            return Err(PoolError::Config(format!(
                "min_pool_size ({}) must not exceed max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }
        Ok(())
    }
}
