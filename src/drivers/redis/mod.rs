//! Redis transport.
//!
//! - Unicast: `LPUSH` on enqueue, `BRPOP` on dequeue, so each list element
//!   is delivered to exactly one consumer.
//! - Broadcast: `PUBLISH` / `SUBSCRIBE`. Messages published while nobody is
//!   subscribed are lost.
//!
//! Commands run on pooled multiplexed connections. A subscription holds its
//! own dedicated pub/sub connection outside the pool.
//!
//! Sub-second dequeue waits are sent to `BRPOP` as fractional seconds, which
//! needs Redis 6.0 or later. Whole-second waits work on any version.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{Client, FromRedisValue};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::dsn::{bounded, ConnectionOptions, TransportProfile};
use crate::error::{QueueError, Result};
use crate::message::{Delivery, Message};
use crate::pool::{discard, ConnectionPool, Lease, PoolSettings};
use crate::queue::{Consumer, ConsumerPtr, Driver, Publisher, PublisherPtr, Subscriber};
use crate::registry::DriverRegistry;
use crate::wait::{race, Shutdown};

mod connection;
mod subscriber;

pub use connection::{connection_url, RedisManager};
pub use subscriber::RedisSubscriber;

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "redis";

/// Shortest wait sent as a `BRPOP` timeout. Redis reads anything shorter
/// as zero, which blocks forever.
const MIN_BLOCKING_WAIT: Duration = Duration::from_millis(1);

/// Time left for the nil `BRPOP` reply to travel back before the local
/// deadline expires.
const REPLY_MARGIN: Duration = Duration::from_millis(100);

/// Add the Redis driver to `registry`.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(DRIVER_NAME, Arc::new(RedisDriver));
}

/// Opens [`RedisQueue`]s.
pub struct RedisDriver;

#[async_trait]
impl Driver for RedisDriver {
    async fn open_publisher(&self, dsn: &str) -> Result<PublisherPtr> {
        Ok(Arc::new(RedisQueue::open(dsn).await?))
    }

    async fn open_consumer(&self, dsn: &str) -> Result<ConsumerPtr> {
        Ok(Arc::new(RedisQueue::open(dsn).await?))
    }
}

/// Publisher and consumer over a Redis connection pool.
pub struct RedisQueue {
    client: Client,
    pool: ConnectionPool<RedisManager>,
    opts: ConnectionOptions,
    shutdown: Shutdown,
}

impl RedisQueue {
    /// Connect and verify the server answers `PING`.
    pub async fn open(dsn: &str) -> Result<Self> {
        let opts = ConnectionOptions::parse(dsn, TransportProfile::Store)?;
        let client = Client::open(connection_url(&opts)?.as_str())?;
        let pool = ConnectionPool::new(
            RedisManager::new(client.clone(), &opts),
            PoolSettings::from_options(&opts),
        )?;

        let queue = Self {
            client,
            pool,
            opts,
            shutdown: Shutdown::new(),
        };
        queue.ping().await?;

        info!(
            host = %queue.opts.hosts()[0],
            max_active = queue.opts.pool_size(),
            "Connected to Redis"
        );
        Ok(queue)
    }

    /// Round-trip a `PING` on a pooled connection.
    pub async fn ping(&self) -> Result<()> {
        let _: String = self
            .execute("PING", &redis::cmd("PING"), bounded(self.opts.read_timeout))
            .await?;
        Ok(())
    }

    /// Take a connection out of the pool for commands this crate does not
    /// wrap. It is never returned; dropping it closes it.
    pub async fn detach_connection(&self) -> Result<MultiplexedConnection> {
        self.ensure_open()?;
        Ok(discard(self.pool.borrow().await?))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Run one command on a pooled connection, discarding the connection if
    /// the command fails.
    async fn execute<T>(&self, op: &str, cmd: &redis::Cmd, limit: Option<Duration>) -> Result<T>
    where
        T: FromRedisValue + Send,
    {
        self.ensure_open()?;
        let mut conn = self.pool.borrow().await?;

        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, cmd.query_async(&mut *conn)).await {
                Ok(result) => result.map_err(QueueError::from),
                Err(_) => Err(QueueError::Transport(format!("{op} timed out after {limit:?}"))),
            },
            None => cmd.query_async(&mut *conn).await.map_err(QueueError::from),
        };

        if result.is_err() {
            discard(conn);
        }
        result
    }

    async fn push(&self, op: &str, subject: &str, msg: &Message) -> Result<i64> {
        let payload = msg.to_bytes();
        let mut cmd = redis::cmd(op);
        cmd.arg(subject).arg(payload.as_ref());

        let reply = self.execute(op, &cmd, bounded(self.opts.write_timeout)).await?;
        if self.opts.debug {
            debug!(op, subject, message_id = %msg.message_id, bytes = payload.len(), reply, "Redis command");
        }
        Ok(reply)
    }
}

/// Pop one element, waiting at most `wait`.
async fn pop(conn: &mut MultiplexedConnection, subject: &str, wait: Duration) -> Result<Bytes> {
    let popped: Option<Vec<u8>> = if wait < MIN_BLOCKING_WAIT {
        redis::cmd("RPOP").arg(subject).query_async(conn).await?
    } else {
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(subject)
            .arg(brpop_timeout(wait))
            .query_async(conn)
            .await?;
        reply.map(|(_, payload)| payload)
    };
    popped.map(Bytes::from).ok_or(QueueError::Timeout)
}

/// `BRPOP` timeout argument in seconds, integral when possible.
fn brpop_timeout(wait: Duration) -> String {
    if wait.subsec_millis() == 0 {
        wait.as_secs().to_string()
    } else {
        format!("{:.3}", wait.as_secs_f64())
    }
}

#[async_trait]
impl Publisher for RedisQueue {
    async fn enqueue(&self, subject: &str, mut msg: Message) -> Result<String> {
        let id = msg.ensure_id();
        self.push("LPUSH", subject, &msg).await?;
        Ok(id)
    }

    async fn publish(&self, subject: &str, mut msg: Message) -> Result<String> {
        let id = msg.ensure_id();
        let receivers = self.push("PUBLISH", subject, &msg).await?;
        if receivers == 0 {
            debug!(subject, message_id = %id, "No subscribers for message");
        }
        Ok(id)
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            self.pool.close();
            info!("Redis queue closed");
        }
        Ok(())
    }
}

#[async_trait]
impl Consumer for RedisQueue {
    async fn dequeue_raw(&self, subject: &str, _group: &str, timeout: Duration) -> Result<Delivery> {
        let deadline = Instant::now() + timeout;

        let src = race(timeout, &self.shutdown, async {
            // The server gives up REPLY_MARGIN before the local timer, so an
            // empty poll normally ends with a nil reply and the connection is
            // released. If the timer still wins, the lease drops with BRPOP
            // pending and the connection is discarded with it.
            let mut conn = Lease::new(self.pool.borrow().await?);
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .saturating_sub(REPLY_MARGIN);
            let popped = pop(&mut conn, subject, wait).await;
            if matches!(popped, Ok(_) | Err(QueueError::Timeout)) {
                conn.release();
            }
            popped
        })
        .await
        .into_result()?;

        if self.opts.debug {
            debug!(subject, bytes = src.len(), "Redis BRPOP");
        }
        Delivery::from_wire(src)
    }

    async fn subscribe(&self, subject: &str, _group: &str) -> Result<Box<dyn Subscriber>> {
        self.ensure_open()?;
        let subscriber = RedisSubscriber::connect(&self.client, subject, self.opts.connect_timeout).await?;
        Ok(Box::new(subscriber))
    }

    async fn close(&self) -> Result<()> {
        Publisher::close(self).await
    }
}
