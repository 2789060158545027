//! Pool lifecycle events.
//!
//! The pool core emits exactly one kind of event: [`ConnectionClosedEvent`],
//! published synchronously with the state change that disposed the
//! connection. Open/ready events belong to the transport layer and are not
//! emitted here.

use std::fmt;
use std::sync::Arc;

use crate::config::ServerAddress;

/// Why a connection was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClosedReason {
    /// The connection's generation no longer matched the pool's.
    Stale,

    /// The connection sat idle longer than the configured `max_idle_time`.
    Idle,

    /// The pool was fully disconnected.
    PoolClosed,

    /// The connection experienced an error.
    Error,
}

impl fmt::Display for ConnectionClosedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Stale => "stale",
            Self::Idle => "idle",
            Self::PoolClosed => "pool closed",
            Self::Error => "error",
        };
        f.write_str(reason)
    }
}

/// Emitted whenever the pool disposes a connection.
///
/// Each event corresponds to a real decrement of the pool's live connection
/// count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClosedEvent {
    /// Endpoint the connection belonged to.
    pub address: ServerAddress,

    /// Identifier of the disposed connection.
    pub connection_id: u64,

    /// Why the connection was disposed.
    pub reason: ConnectionClosedReason,
}

/// Subscriber for pool lifecycle events.
///
/// Handlers are invoked synchronously while the pool holds its internal
/// lock; implementations must not block or call back into the pool.
pub trait PoolEventHandler: Send + Sync {
    /// Called when the pool disposes a connection.
    fn connection_closed(&self, event: ConnectionClosedEvent);
}

/// Shared, type-erased event handler.
pub type DynPoolEventHandler = Arc<dyn PoolEventHandler>;
