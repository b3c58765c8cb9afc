//! Pooled Redis connections.

use std::time::Duration;

use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::warn;

use crate::dsn::{bounded, ConnectionOptions};
use crate::error::{QueueError, Result};
use crate::pool::{idle_expired, needs_probe};

const DEFAULT_PORT: u16 = 6379;

/// Build a `redis://` URL from parsed connection options.
///
/// Only the first host is used; the path selects the database index.
pub fn connection_url(opts: &ConnectionOptions) -> Result<String> {
    let hosts = opts.hosts();
    if hosts.len() > 1 {
        warn!(hosts = ?hosts, "Redis driver uses only the first host");
    }
    let host = &hosts[0];
    let host = if host.contains(':') {
        host.clone()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    };

    let auth = match (&opts.dsn.username, &opts.dsn.password) {
        (Some(user), Some(pass)) => format!("{user}:{pass}@"),
        (None, Some(pass)) => format!(":{pass}@"),
        (Some(user), None) => format!("{user}@"),
        (None, None) => String::new(),
    };

    let db = match opts.dsn.path.as_deref() {
        Some(db) => db
            .parse::<u32>()
            .map_err(|_| QueueError::InvalidDsn(format!("bad redis database {db:?}")))?,
        None => 0,
    };

    Ok(format!("redis://{auth}{host}/{db}"))
}

/// Creates multiplexed connections and vets them on borrow.
pub struct RedisManager {
    client: Client,
    ttl: Duration,
    idle_timeout: Option<Duration>,
}

impl RedisManager {
    pub fn new(client: Client, opts: &ConnectionOptions) -> Self {
        Self {
            client,
            ttl: opts.ttl,
            idle_timeout: bounded(opts.idle_timeout),
        }
    }
}

impl Manager for RedisManager {
    type Type = MultiplexedConnection;
    type Error = QueueError;

    async fn create(&self) -> std::result::Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        metrics: &Metrics,
    ) -> RecycleResult<QueueError> {
        if idle_expired(metrics, self.idle_timeout) {
            return Err(RecycleError::Backend(QueueError::Transport(
                "idle timeout exceeded".to_string(),
            )));
        }
        if !needs_probe(metrics, self.ttl) {
            return Ok(());
        }
        let _: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| RecycleError::Backend(e.into()))?;
        Ok(())
    }
}
