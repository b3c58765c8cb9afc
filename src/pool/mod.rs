//! Connection pool shared by the pooled drivers.
//!
//! Thin policy layer over `deadpool::managed`:
//! - a borrowed connection is exclusively owned until dropped (returned) or
//!   [`discard`]ed after a transport error;
//! - connections idle for at least `ttl` are liveness-probed on borrow by the
//!   manager's `recycle`, and dead ones are replaced;
//! - failures to establish a connection are retried a fixed number of times;
//! - waiting for a free slot is bounded, and exhaustion is reported as
//!   [`QueueError::PoolExhausted`] without retrying;
//! - a background task trims idle connections to `max_idle` and evicts those
//!   idle past `idle_timeout`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use deadpool::managed::{Manager, Metrics, Object, Pool, PoolError, Status, TimeoutType};
use deadpool::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dsn::{bounded, ConnectionOptions};
use crate::error::{QueueError, Result};

/// Borrow attempts before a connection failure is surfaced.
pub const MAX_BORROW_ATTEMPTS: usize = 3;

const BORROW_RETRY_DELAY: Duration = Duration::from_millis(50);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// A connection on loan from a [`ConnectionPool`].
pub type PooledConnection<M> = Object<M>;

/// Sizing and timing policy for a [`ConnectionPool`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_size: usize,
    pub max_idle: usize,
    /// Bound on waiting for a free slot.
    pub wait_timeout: Option<Duration>,
    /// Bound on establishing a new connection.
    pub create_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub maintenance_interval: Duration,
}

impl PoolSettings {
    pub fn from_options(opts: &ConnectionOptions) -> Self {
        Self {
            max_size: opts.pool_size(),
            max_idle: opts.idle_limit(),
            wait_timeout: bounded(opts.connect_timeout),
            create_timeout: bounded(opts.connect_timeout),
            idle_timeout: bounded(opts.idle_timeout),
            maintenance_interval: MAINTENANCE_INTERVAL,
        }
    }
}

/// True when a connection has been idle long enough to need a liveness probe.
pub fn needs_probe(metrics: &Metrics, ttl: Duration) -> bool {
    metrics.last_used() >= ttl
}

/// True when a connection has been idle past `idle_timeout`.
pub fn idle_expired(metrics: &Metrics, idle_timeout: Option<Duration>) -> bool {
    idle_timeout.is_some_and(|limit| metrics.last_used() >= limit)
}

/// Remove a connection from its pool instead of returning it.
pub fn discard<M: Manager>(conn: PooledConnection<M>) -> M::Type {
    Object::take(conn)
}

/// A borrowed connection that is discarded unless explicitly released.
///
/// Used around blocking commands: if the waiting future is dropped while the
/// command is still in flight, the connection must not go back to the pool.
pub struct Lease<M: Manager> {
    conn: Option<PooledConnection<M>>,
}

impl<M: Manager> Lease<M> {
    pub fn new(conn: PooledConnection<M>) -> Self {
        Self { conn: Some(conn) }
    }

    /// Return the connection to the pool.
    pub fn release(mut self) {
        self.conn.take();
    }
}

impl<M: Manager> std::ops::Deref for Lease<M> {
    type Target = M::Type;

    fn deref(&self) -> &M::Type {
        self.conn.as_ref().expect("lease already released")
    }
}

impl<M: Manager> std::ops::DerefMut for Lease<M> {
    fn deref_mut(&mut self) -> &mut M::Type {
        self.conn.as_mut().expect("lease already released")
    }
}

impl<M: Manager> Drop for Lease<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            discard(conn);
        }
    }
}

/// Bounded connection pool.
pub struct ConnectionPool<M: Manager> {
    inner: Pool<M>,
    maintenance: JoinHandle<()>,
}

impl<M> ConnectionPool<M>
where
    M: Manager<Error = QueueError> + 'static,
{
    /// Build the pool and start its maintenance task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(manager: M, settings: PoolSettings) -> Result<Self> {
        let inner = Pool::builder(manager)
            .max_size(settings.max_size)
            .wait_timeout(settings.wait_timeout)
            .create_timeout(settings.create_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| QueueError::Transport(format!("failed to create pool: {e}")))?;

        let maintenance = tokio::spawn(maintain(
            inner.clone(),
            settings.max_idle,
            settings.idle_timeout,
            settings.maintenance_interval,
        ));

        Ok(Self { inner, maintenance })
    }

    /// Borrow a live connection.
    pub async fn borrow(&self) -> Result<PooledConnection<M>> {
        let backoff = ConstantBuilder::default()
            .with_delay(BORROW_RETRY_DELAY)
            .with_max_times(MAX_BORROW_ATTEMPTS - 1)
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.inner.get().await {
                Ok(conn) => return Ok(conn),
                Err(PoolError::Timeout(TimeoutType::Wait)) => return Err(QueueError::PoolExhausted),
                Err(PoolError::Closed) => return Err(QueueError::Closed),
                Err(PoolError::Backend(e)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = MAX_BORROW_ATTEMPTS,
                        error = %e,
                        "Failed to get pooled connection"
                    );
                    last_error = Some(e);
                }
                Err(PoolError::Timeout(kind)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = MAX_BORROW_ATTEMPTS,
                        timeout = ?kind,
                        "Timed out preparing pooled connection"
                    );
                    last_error = Some(QueueError::Transport(format!(
                        "timed out preparing connection ({kind:?})"
                    )));
                }
                Err(other) => {
                    return Err(QueueError::Transport(format!("connection pool: {other}")));
                }
            }
        }

        Err(last_error.unwrap_or(QueueError::PoolExhausted))
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the pool. Idle connections are dropped and pending borrows fail.
    pub fn close(&self) {
        self.maintenance.abort();
        self.inner.close();
    }
}

impl<M: Manager> Drop for ConnectionPool<M> {
    fn drop(&mut self) {
        self.maintenance.abort();
    }
}

async fn maintain<M: Manager>(
    pool: Pool<M>,
    max_idle: usize,
    idle_timeout: Option<Duration>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if pool.is_closed() {
            break;
        }
        trim_idle(&pool, max_idle, idle_timeout);
    }
}

/// Drop idle connections beyond `max_idle` or idle past `idle_timeout`.
fn trim_idle<M: Manager>(pool: &Pool<M>, max_idle: usize, idle_timeout: Option<Duration>) {
    let kept = AtomicUsize::new(0);
    let removed = AtomicUsize::new(0);

    let _ = pool.retain(|_, metrics| {
        let keep = !idle_expired(&metrics, idle_timeout)
            && kept.fetch_add(1, Ordering::Relaxed) < max_idle;
        if !keep {
            removed.fetch_add(1, Ordering::Relaxed);
        }
        keep
    });

    let removed = removed.into_inner();
    if removed > 0 {
        debug!(removed, max_idle, "Trimmed idle pooled connections");
    }
}

#[cfg(test)]
mod tests;
