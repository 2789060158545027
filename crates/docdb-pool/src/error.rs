//! Pool error types.

use std::io;

use thiserror::Error;

use crate::config::ServerAddress;

/// Convenience alias for pool results.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The checkout deadline elapsed with no connection available.
    ///
    /// Expected under load; the pool's state is unchanged and the caller
    /// may retry.
    #[error("timed out waiting for a connection to {address} (pool size {pool_size})")]
    WaitQueueTimeout {
        /// Endpoint the checkout targeted.
        address: ServerAddress,
        /// Live connection count at the moment the deadline elapsed.
        pool_size: usize,
    },

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// The connection factory failed to establish a connection.
    #[error("connection handshake failed: {0}")]
    Connect(#[from] io::Error),
}
