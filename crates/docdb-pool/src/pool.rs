//! Connection pool implementation.
//!
//! A pool holds a LIFO stack of idle connections for a single endpoint,
//! bounded by the configured minimum and maximum sizes. Checkout drains the
//! idle stack front-first, creates a new connection when below the maximum,
//! or blocks under a deadline; check-in returns connections to the front of
//! the stack. A monotonic generation counter invalidates whole cohorts of
//! connections lazily, without traversing in-flight work.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::{PoolConfig, ServerAddress};
use crate::conn::{ConnectionFactory, PooledConnection};
use crate::error::{PoolError, Result};
use crate::event::{ConnectionClosedEvent, ConnectionClosedReason, DynPoolEventHandler};
use crate::wait_queue::WaitQueue;

/// Mutable pool state, guarded by the pool mutex.
struct PoolState<C> {
    /// Idle connections, most-recently-returned at the front.
    idle: VecDeque<PooledConnection<C>>,

    /// Total live connections, idle and checked out. The pool does not
    /// track checked-out identities.
    pool_size: usize,

    /// Monotonic invalidation stamp. Connections whose stamp no longer
    /// matches are disposed lazily as the pool next touches them.
    generation: u64,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections created.
    connections_created: u64,
    /// Total connections closed.
    connections_closed: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, handshake errors).
    checkouts_failed: u64,
    /// Checkouts that failed specifically on the wait-queue deadline.
    wait_timeouts: u64,
}

/// A bounded, fair, generation-aware connection pool for one endpoint.
///
/// The pool is generic over a [`ConnectionFactory`] that performs the
/// transport handshake. All operations are safe to call from many threads
/// sharing the pool through an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use docdb_driver_pool::{Pool, PoolConfig, ServerAddress};
///
/// let config = PoolConfig::new().min_pool_size(2).max_pool_size(10);
/// let pool = Pool::builder(ServerAddress::new("db0.example.com", 27017), factory)
///     .config(config)
///     .build()?;
///
/// let conn = pool.check_out()?;
/// // Use the connection...
/// pool.check_in(conn);
/// ```
pub struct Pool<F: ConnectionFactory> {
    address: ServerAddress,
    config: PoolConfig,
    factory: F,
    event_handler: Option<DynPoolEventHandler>,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    state: Mutex<PoolState<F::Conn>>,

    /// Signaled on every check-in so blocked checkouts can reassess.
    available: Condvar,

    wait_queue: WaitQueue,

    metrics: Mutex<PoolMetricsInner>,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder(address: ServerAddress, factory: F) -> PoolBuilder<F> {
        PoolBuilder::new(address, factory)
    }

    /// Create a new pool with the given configuration.
    ///
    /// Validates the configuration, then eagerly fills the idle stack to
    /// `min_pool_size`, propagating any handshake failure. For more control
    /// (such as attaching an event handler) use [`Pool::builder()`].
    pub fn new(address: ServerAddress, config: PoolConfig, factory: F) -> Result<Self> {
        Self::with_event_handler(address, config, factory, None)
    }

    fn with_event_handler(
        address: ServerAddress,
        config: PoolConfig,
        factory: F,
        event_handler: Option<DynPoolEventHandler>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            address,
            config,
            factory,
            event_handler,
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                pool_size: 0,
                generation: 1,
            }),
            available: Condvar::new(),
            wait_queue: WaitQueue::new(),
            metrics: Mutex::new(PoolMetricsInner::default()),
        };

        {
            let mut state = pool.state.lock();
            while state.pool_size < pool.config.min_pool_size {
                match pool.connect(state.generation) {
                    Ok(conn) => {
                        state.pool_size += 1;
                        state.idle.push_back(conn);
                    }
                    Err(error) => {
                        // Tear down the partial fill before surfacing the error.
                        while let Some(mut conn) = state.idle.pop_front() {
                            state.pool_size -= 1;
                            conn.disconnect();
                        }
                        return Err(error);
                    }
                }
            }
        }

        tracing::info!(
            address = %pool.address,
            min = pool.config.min_pool_size,
            max = pool.config.max_pool_size,
            "connection pool created"
        );

        Ok(pool)
    }

    /// Check out a connection.
    ///
    /// Returns an idle connection, creates a new one if the pool is below
    /// its maximum, or blocks until one is returned, whichever comes first
    /// within `wait_queue_timeout`. Requesters are served in strict FIFO
    /// order with respect to returned connections: only the head of the
    /// wait queue is woken by a check-in.
    ///
    /// # Errors
    ///
    /// [`PoolError::WaitQueueTimeout`] when the deadline elapses with no
    /// connection available; [`PoolError::Connect`] when the handshake for
    /// a new connection fails (the reserved slot is rolled back).
    pub fn check_out(&self) -> Result<PooledConnection<F::Conn>> {
        let deadline = Instant::now() + self.config.wait_queue_timeout;
        let enrollment = self.wait_queue.enroll();

        if let Some(waiter) = enrollment.waiter() {
            if !waiter.wait_until(deadline) {
                // The deadline elapsed before a wake; the requester still
                // gets one atomic attempt under the mutex.
                tracing::trace!(address = %self.address, "wait queue deadline elapsed before wake");
            }
        }

        let result = self.attempt_check_out(deadline);

        // Withdraw unconditionally so the next entry becomes the head.
        self.wait_queue.withdraw(enrollment.ticket());

        let mut metrics = self.metrics.lock();
        match &result {
            Ok(_) => metrics.checkouts_successful += 1,
            Err(error) => {
                metrics.checkouts_failed += 1;
                if matches!(error, PoolError::WaitQueueTimeout { .. }) {
                    metrics.wait_timeouts += 1;
                }
            }
        }
        drop(metrics);

        result
    }

    fn attempt_check_out(&self, deadline: Instant) -> Result<PooledConnection<F::Conn>> {
        let mut state = self.state.lock();

        loop {
            // Drain the front of the idle stack. Stale takes precedence
            // over idle expiry when a connection fails both checks.
            while let Some(conn) = state.idle.pop_front() {
                if conn.generation() != state.generation {
                    self.dispose(&mut state, conn, ConnectionClosedReason::Stale);
                } else if self
                    .config
                    .max_idle_time
                    .is_some_and(|max_idle| conn.idle_longer_than(max_idle))
                {
                    self.dispose(&mut state, conn, ConnectionClosedReason::Idle);
                } else {
                    self.assert_invariants(&state);
                    return Ok(conn);
                }
            }

            if state.pool_size < self.config.max_pool_size {
                // Reserve the slot, then run the handshake with the pool
                // unlocked so other checkouts are not serialized behind it.
                state.pool_size += 1;
                let generation = state.generation;
                let connected = MutexGuard::unlocked(&mut state, || self.connect(generation));
                match connected {
                    Ok(conn) => {
                        self.assert_invariants(&state);
                        return Ok(conn);
                    }
                    Err(error) => {
                        state.pool_size -= 1;
                        self.available.notify_all();
                        return Err(error);
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(PoolError::WaitQueueTimeout {
                    address: self.address.clone(),
                    pool_size: state.pool_size,
                });
            }

            // A timed-out wait still falls through to one more pass over
            // the idle stack before the deadline check above raises.
            let _ = self.available.wait_until(&mut state, deadline);
        }
    }

    /// Return a previously checked-out connection.
    ///
    /// A connection whose generation no longer matches the pool's is
    /// disposed instead of pooled. Cannot fail.
    pub fn check_in(&self, conn: PooledConnection<F::Conn>) {
        let mut state = self.state.lock();

        if conn.generation() != state.generation {
            self.dispose(&mut state, conn, ConnectionClosedReason::Stale);
        } else {
            let mut conn = conn;
            conn.stamp_checkin(Instant::now());
            state.idle.push_front(conn);
        }

        self.assert_invariants(&state);

        // Two complementary wakes: the head latch releases a pre-wait
        // sleeper, the condvar releases checkouts blocked mid-loop. The
        // wait-queue mutex nests inside the pool mutex here.
        self.wait_queue.signal_head();
        self.available.notify_all();
    }

    /// Invalidate every live connection.
    ///
    /// O(1): the generation advances and stale connections are disposed
    /// lazily as checkout or check-in next touches them. Safe to call from
    /// a monitoring callback while checkouts are in flight.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        tracing::debug!(
            address = %self.address,
            generation = state.generation,
            "pool generation advanced"
        );
    }

    /// Close every idle connection and rebuild the minimum.
    ///
    /// Each idle connection is disposed with reason
    /// [`PoolClosed`](ConnectionClosedReason::PoolClosed), the generation
    /// advances, and the idle stack is refilled to `min_pool_size` with the
    /// new generation. Refill failures are logged and stop the refill; they
    /// never propagate.
    pub fn disconnect_all(&self) {
        let mut state = self.state.lock();

        while let Some(conn) = state.idle.pop_front() {
            self.dispose(&mut state, conn, ConnectionClosedReason::PoolClosed);
        }

        state.generation += 1;
        let generation = state.generation;
        tracing::info!(
            address = %self.address,
            generation,
            "pool disconnected; rebuilding to minimum size"
        );

        // Refill targets the idle stack: connections still in flight will
        // come back stale, so they cannot be counted toward the minimum.
        while state.idle.len() < self.config.min_pool_size
            && state.pool_size < self.config.max_pool_size
        {
            state.pool_size += 1;
            let connected = MutexGuard::unlocked(&mut state, || self.connect(generation));
            match connected {
                Ok(conn) => {
                    if conn.generation() == state.generation {
                        state.idle.push_back(conn);
                    } else {
                        // Another invalidation raced the handshake.
                        self.dispose(&mut state, conn, ConnectionClosedReason::Stale);
                    }
                }
                Err(error) => {
                    state.pool_size -= 1;
                    tracing::warn!(
                        address = %self.address,
                        error = %error,
                        "failed to rebuild connection after disconnect"
                    );
                    break;
                }
            }
        }

        self.assert_invariants(&state);
        self.available.notify_all();
    }

    /// Dispose of idle connections that have outlived `max_idle_time`.
    ///
    /// No-op unless `max_idle_time` is configured. Expired connections that
    /// must stay reachable to keep the pool at its minimum are refreshed in
    /// place instead of removed; refresh failures are swallowed and the
    /// dead entry is culled by the next checkout that draws it.
    pub fn close_stale_sockets(&self) {
        let Some(max_idle_time) = self.config.max_idle_time else {
            return;
        };

        // Snapshot candidate ids first; the disposal pass re-checks each
        // one since it may have been checked out in between.
        let candidates: Vec<u64> = {
            let state = self.state.lock();
            state
                .idle
                .iter()
                .filter(|conn| conn.idle_longer_than(max_idle_time))
                .map(|conn| conn.id())
                .collect()
        };
        if candidates.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        let checked_out = state.pool_size - state.idle.len();
        let min_size_delta = self.config.min_pool_size.saturating_sub(checked_out);

        for id in candidates {
            let Some(position) = state.idle.iter().position(|conn| conn.id() == id) else {
                continue;
            };

            if position < min_size_delta {
                // This slot must stay reachable to keep the pool at its
                // minimum if every checked-out connection were returned.
                let generation = state.generation;
                state.idle[position].disconnect();
                match self.connect(generation) {
                    Ok(mut fresh) => {
                        fresh.stamp_checkin(Instant::now());
                        state.idle[position] = fresh;
                    }
                    Err(error) => {
                        // The dead entry stays in the stack, still counted,
                        // until the next checkout draws and culls it.
                        tracing::warn!(
                            address = %self.address,
                            connection_id = id,
                            error = %error,
                            "failed to refresh idle connection in place"
                        );
                    }
                }
            } else if let Some(conn) = state.idle.remove(position) {
                self.dispose(&mut state, conn, ConnectionClosedReason::Idle);
            }
        }

        self.assert_invariants(&state);
    }

    /// Number of idle connections ready for checkout.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Total live connections, idle and checked out.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.state.lock().pool_size
    }

    /// Current pool generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of connections currently checked out.
    #[must_use]
    pub fn checked_out_count(&self) -> usize {
        let state = self.state.lock();
        state.pool_size - state.idle.len()
    }

    /// Number of requesters enrolled in the wait queue.
    #[must_use]
    pub fn wait_queue_depth(&self) -> usize {
        self.wait_queue.len()
    }

    /// Endpoint this pool targets.
    #[must_use]
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Point-in-time snapshot of the pool.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            available: state.idle.len(),
            in_use: state.pool_size - state.idle.len(),
            total: state.pool_size,
            max: self.config.max_pool_size,
            wait_queue_depth: self.wait_queue.len(),
            generation: state.generation,
        }
    }

    /// Cumulative pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            wait_timeouts: inner.wait_timeouts,
            uptime: self.created_at.elapsed(),
        }
    }

    /// Run the factory handshake and wrap the result.
    fn connect(&self, generation: u64) -> Result<PooledConnection<F::Conn>> {
        let raw = self.factory.connect(&self.address)?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.lock().connections_created += 1;
        tracing::debug!(
            address = %self.address,
            connection_id = id,
            generation,
            "connection established"
        );
        Ok(PooledConnection::new(id, generation, raw))
    }

    /// Dispose a connection: decrement accounting, tear down the transport,
    /// and emit the closed event, all under the pool mutex.
    fn dispose(
        &self,
        state: &mut PoolState<F::Conn>,
        mut conn: PooledConnection<F::Conn>,
        reason: ConnectionClosedReason,
    ) {
        if state.pool_size == 0 {
            tracing::warn!(
                address = %self.address,
                connection_id = conn.id(),
                "pool size underflow while disposing a connection; clamping to 0"
            );
            if self.config.lint {
                panic!(
                    "pool size underflow: disposing connection {} from an empty pool",
                    conn.id()
                );
            }
        } else {
            state.pool_size -= 1;
        }

        conn.disconnect();
        self.metrics.lock().connections_closed += 1;
        tracing::debug!(
            address = %self.address,
            connection_id = conn.id(),
            reason = %reason,
            "connection closed"
        );

        if let Some(handler) = &self.event_handler {
            handler.connection_closed(ConnectionClosedEvent {
                address: self.address.clone(),
                connection_id: conn.id(),
                reason,
            });
        }
    }

    /// Invariant checkpoint; panics in lint mode.
    ///
    /// The minimum bound is not asserted here: it legitimately does not
    /// hold during construction, disconnect-and-rebuild, and active
    /// checkout.
    fn assert_invariants(&self, state: &PoolState<F::Conn>) {
        if !self.config.lint {
            return;
        }
        assert!(
            state.idle.len() <= state.pool_size,
            "idle count {} exceeds pool size {}",
            state.idle.len(),
            state.pool_size
        );
        assert!(
            state.pool_size <= self.config.max_pool_size,
            "pool size {} exceeds maximum {}",
            state.pool_size,
            self.config.max_pool_size
        );
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.address)
            .field("min_pool_size", &self.config.min_pool_size)
            .field("max_pool_size", &self.config.max_pool_size)
            .finish_non_exhaustive()
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(address, factory)
///     .max_pool_size(20)
///     .event_handler(handler)
///     .build()?;
/// ```
pub struct PoolBuilder<F: ConnectionFactory> {
    address: ServerAddress,
    config: PoolConfig,
    factory: F,
    event_handler: Option<DynPoolEventHandler>,
}

impl<F: ConnectionFactory> PoolBuilder<F> {
    /// Create a new pool builder with default settings.
    pub fn new(address: ServerAddress, factory: F) -> Self {
        Self {
            address,
            config: PoolConfig::default(),
            factory,
            event_handler: None,
        }
    }

    /// Set the pool configuration wholesale.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_pool_size(mut self, size: usize) -> Self {
        self.config.min_pool_size = size;
        self
    }

    /// Set the checkout deadline.
    #[must_use]
    pub fn wait_queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_queue_timeout = timeout;
        self
    }

    /// Set the idle expiry threshold, enabling idle reaping.
    #[must_use]
    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.config.max_idle_time = Some(max_idle_time);
        self
    }

    /// Attach a lifecycle event handler.
    #[must_use]
    pub fn event_handler(mut self, handler: DynPoolEventHandler) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the pool, eagerly filling to the minimum size.
    pub fn build(self) -> Result<Pool<F>> {
        Pool::with_event_handler(self.address, self.config, self.factory, self.event_handler)
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: usize,
    /// Number of connections currently checked out.
    pub in_use: usize,
    /// Total number of live connections.
    pub total: usize,
    /// Maximum allowed connections.
    pub max: usize,
    /// Number of requesters waiting for a connection.
    pub wait_queue_depth: usize,
    /// Current pool generation.
    pub generation: u64,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, handshake errors).
    pub checkouts_failed: u64,
    /// Checkouts that failed on the wait-queue deadline.
    pub wait_timeouts: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}
