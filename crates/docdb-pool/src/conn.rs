//! Connection contracts and the pooled connection wrapper.
//!
//! The pool does not construct transport connections itself. It is generic
//! over a [`ConnectionFactory`] that performs the TCP/TLS handshake and
//! authentication, producing a raw [`Transport`]. The pool wraps every live
//! transport in a [`PooledConnection`] carrying the bookkeeping the pool
//! relies on: a stable id, the generation stamp, and the last check-in time.

use std::io;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::config::ServerAddress;

/// Contract the pool requires from a transport connection.
pub trait Transport: Send + 'static {
    /// Tear down the underlying stream.
    ///
    /// Must be idempotent; the pool may call it on a connection that is
    /// already disconnected.
    fn disconnect(&mut self);
}

/// Produces new transport connections for a single endpoint.
///
/// The factory performs the full handshake (TCP connect, TLS, auth) and is
/// expected to bound its own handshake time; the pool does not impose a
/// deadline on it.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The transport connection type this factory produces.
    type Conn: Transport;

    /// Establish a new connection to `address`.
    fn connect(&self, address: &ServerAddress) -> io::Result<Self::Conn>;
}

/// A live connection owned by the pool or checked out to a caller.
///
/// Ownership expresses the checkout protocol: the wrapper sits in the idle
/// stack while pooled, moves to the caller on checkout, and moves back on
/// check-in. A wrapper that is dropped instead of checked in permanently
/// occupies a pool slot; always return connections with
/// [`Pool::check_in`](crate::Pool::check_in).
#[derive(Debug)]
pub struct PooledConnection<C> {
    id: u64,
    generation: u64,
    last_checkin: Option<Instant>,
    conn: C,
}

impl<C: Transport> PooledConnection<C> {
    pub(crate) fn new(id: u64, generation: u64, conn: C) -> Self {
        Self {
            id,
            generation,
            last_checkin: None,
            conn,
        }
    }

    /// Stable identifier of this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pool generation this connection was created under.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this connection was last returned to the pool, if ever.
    #[must_use]
    pub fn last_checkin(&self) -> Option<Instant> {
        self.last_checkin
    }

    pub(crate) fn stamp_checkin(&mut self, now: Instant) {
        self.last_checkin = Some(now);
    }

    /// Whether the connection has sat idle longer than `max_idle_time`.
    ///
    /// A connection that has never been checked in cannot expire.
    pub(crate) fn idle_longer_than(&self, max_idle_time: Duration) -> bool {
        self.last_checkin
            .is_some_and(|at| at.elapsed() > max_idle_time)
    }

    pub(crate) fn disconnect(&mut self) {
        self.conn.disconnect();
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    impl Transport for NullTransport {
        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_never_checked_in_cannot_expire() {
        let conn = PooledConnection::new(1, 1, NullTransport);
        assert!(!conn.idle_longer_than(Duration::ZERO));
    }

    #[test]
    fn test_checkin_stamp_enables_expiry() {
        let mut conn = PooledConnection::new(1, 1, NullTransport);
        conn.stamp_checkin(Instant::now() - Duration::from_secs(10));
        assert!(conn.idle_longer_than(Duration::from_secs(5)));
        assert!(!conn.idle_longer_than(Duration::from_secs(60)));
    }
}
