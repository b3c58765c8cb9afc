//! In-process transport.
//!
//! Subjects live in a "space" selected by the DSN host, e.g.
//! `channel://local`. Publishers and consumers opened through the same
//! driver instance with the same host see each other's messages.
//!
//! - Broadcast uses a tokio broadcast channel per subject. A subscriber
//!   that falls more than [`CHANNEL_CAPACITY`] messages behind skips ahead.
//! - Unicast uses an unbounded FIFO per subject shared by competing
//!   consumers.
//!
//! Useful for local development and tests without external dependencies.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use crate::dsn::{ConnectionOptions, TransportProfile};
use crate::error::{QueueError, Result};
use crate::message::{Delivery, Message};
use crate::queue::{Consumer, ConsumerPtr, Driver, Publisher, PublisherPtr, Subscriber};
use crate::registry::DriverRegistry;
use crate::wait::{race, Next, Shutdown};

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "channel";

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// Add the in-process driver to `registry`.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(DRIVER_NAME, Arc::new(ChannelDriver::default()));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Driver handing out queues over shared in-memory spaces.
#[derive(Default)]
pub struct ChannelDriver {
    spaces: Mutex<HashMap<String, Arc<ChannelSpace>>>,
}

impl ChannelDriver {
    fn open(&self, dsn: &str) -> Result<ChannelQueue> {
        let opts = ConnectionOptions::parse(dsn, TransportProfile::Store)?;
        let name = opts.hosts().join(",");

        let space = lock(&self.spaces)
            .entry(name.clone())
            .or_default()
            .clone();

        info!(space = %name, "Channel queue opened");

        Ok(ChannelQueue {
            space,
            shutdown: Shutdown::new(),
        })
    }
}

#[async_trait]
impl Driver for ChannelDriver {
    async fn open_publisher(&self, dsn: &str) -> Result<PublisherPtr> {
        Ok(Arc::new(self.open(dsn)?))
    }

    async fn open_consumer(&self, dsn: &str) -> Result<ConsumerPtr> {
        Ok(Arc::new(self.open(dsn)?))
    }
}

/// Subjects of one DSN host.
#[derive(Default)]
struct ChannelSpace {
    topics: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    queues: Mutex<HashMap<String, Arc<UnicastQueue>>>,
}

impl ChannelSpace {
    fn topic(&self, subject: &str) -> broadcast::Sender<Bytes> {
        lock(&self.topics)
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn queue(&self, subject: &str) -> Arc<UnicastQueue> {
        lock(&self.queues)
            .entry(subject.to_string())
            .or_default()
            .clone()
    }
}

/// FIFO with competing poppers.
#[derive(Default)]
struct UnicastQueue {
    items: Mutex<VecDeque<Bytes>>,
    ready: Notify,
}

impl UnicastQueue {
    fn push(&self, item: Bytes) {
        lock(&self.items).push_back(item);
        self.ready.notify_one();
    }

    async fn pop(&self) -> Bytes {
        loop {
            let notified = self.ready.notified();
            let item = lock(&self.items).pop_front();
            if let Some(item) = item {
                return item;
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        lock(&self.items).len()
    }
}

/// Publisher and consumer over one [`ChannelSpace`].
pub struct ChannelQueue {
    space: Arc<ChannelSpace>,
    shutdown: Shutdown,
}

impl ChannelQueue {
    fn ensure_open(&self) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Messages waiting on a unicast subject.
    pub fn pending(&self, subject: &str) -> usize {
        self.space.queue(subject).len()
    }

    fn shutdown(&self) {
        if self.shutdown.trigger() {
            debug!("Channel queue closed");
        }
    }
}

#[async_trait]
impl Publisher for ChannelQueue {
    async fn enqueue(&self, subject: &str, mut msg: Message) -> Result<String> {
        self.ensure_open()?;
        let id = msg.ensure_id();
        self.space.queue(subject).push(msg.to_bytes());
        debug!(subject, message_id = %id, "Enqueued message via channel");
        Ok(id)
    }

    async fn publish(&self, subject: &str, mut msg: Message) -> Result<String> {
        self.ensure_open()?;
        let id = msg.ensure_id();

        // Send to channel (ignore error if no receivers)
        match self.space.topic(subject).send(msg.to_bytes()) {
            Ok(receivers) => {
                debug!(subject, message_id = %id, receivers, "Published message via channel")
            }
            Err(_) => debug!(subject, message_id = %id, "No subscribers for message"),
        }
        Ok(id)
    }

    async fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

#[async_trait]
impl Consumer for ChannelQueue {
    async fn dequeue_raw(&self, subject: &str, _group: &str, timeout: Duration) -> Result<Delivery> {
        let queue = self.space.queue(subject);
        let src = race(timeout, &self.shutdown, async { Ok(queue.pop().await) })
            .await
            .into_result()?;
        Delivery::from_wire(src)
    }

    async fn subscribe(&self, subject: &str, _group: &str) -> Result<Box<dyn Subscriber>> {
        self.ensure_open()?;
        let receiver = self.space.topic(subject).subscribe();
        info!(subject, "Channel subscriber started");
        Ok(Box::new(ChannelSubscriber {
            subject: subject.to_string(),
            receiver: tokio::sync::Mutex::new(receiver),
            shutdown: Shutdown::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

/// A broadcast subscription on one subject.
pub struct ChannelSubscriber {
    subject: String,
    receiver: tokio::sync::Mutex<broadcast::Receiver<Bytes>>,
    shutdown: Shutdown,
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn next(&self, timeout: Duration) -> Next<Message> {
        race(timeout, &self.shutdown, async {
            let mut receiver = self.receiver.lock().await;
            loop {
                match receiver.recv().await {
                    Ok(src) => return Message::from_bytes(&src),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subject = %self.subject, skipped, "Channel subscriber lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(QueueError::Closed),
                }
            }
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            info!(subject = %self.subject, "Channel subscriber closed");
        }
        Ok(())
    }
}
