//! # docdb-driver-pool
//!
//! Bounded, fair, generation-aware connection pool for the DocDB driver.
//!
//! Each pool serves a single server endpoint with a LIFO reservoir of idle
//! connections, a strict-FIFO wait queue for requesters, lazy generation
//! invalidation, and idle-time reaping that respects the configured minimum
//! size. Lifecycle events are published synchronously to a monitoring
//! subscriber.
//!
//! ## Features
//!
//! - LIFO reuse of idle connections (warm TCP state first)
//! - Strict FIFO fairness for waiting checkouts via head-only wake
//! - O(1) invalidation of all live connections (`clear`)
//! - Idle reaping that never shrinks the pool below its minimum
//! - Configurable min/max sizes, checkout deadline, and idle expiry
//! - `ConnectionClosed` lifecycle events for monitoring subscribers
//!
//! ## Example
//!
//! ```rust,ignore
//! use docdb_driver_pool::{Pool, PoolConfig, ServerAddress};
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .min_pool_size(2)
//!     .max_pool_size(10)
//!     .wait_queue_timeout(Duration::from_millis(500))
//!     .max_idle_time(Duration::from_secs(300));
//!
//! let pool = Pool::builder(ServerAddress::new("db0.example.com", 27017), factory)
//!     .config(config)
//!     .build()?;
//!
//! let conn = pool.check_out()?;
//! // Run commands on the connection...
//! pool.check_in(conn);
//!
//! // Topology reset: invalidate every live connection lazily.
//! pool.clear();
//! ```
//!
//! The pool never constructs transport connections itself; implement
//! [`ConnectionFactory`] (and [`Transport`] for its connections) to plug in
//! the handshake.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod conn;
pub mod error;
pub mod event;
pub mod pool;

mod wait_queue;

// Configuration
pub use config::{
    PoolConfig, ServerAddress, DEFAULT_MAX_POOL_SIZE, DEFAULT_MIN_POOL_SIZE,
    DEFAULT_WAIT_QUEUE_TIMEOUT,
};

// Connection contracts
pub use conn::{ConnectionFactory, PooledConnection, Transport};

// Error types
pub use error::{PoolError, Result};

// Lifecycle events
pub use event::{
    ConnectionClosedEvent, ConnectionClosedReason, DynPoolEventHandler, PoolEventHandler,
};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus};
