//! Publisher, Consumer and Subscriber contracts.
//!
//! Two delivery models share one API:
//! - **unicast** ([`Publisher::enqueue`] / [`Consumer::dequeue_raw`]): each
//!   message goes to exactly one of the competing consumers on a subject;
//! - **broadcast** ([`Publisher::publish`] / [`Consumer::subscribe`]): each
//!   message goes to every subscriber active at publish time (or, on log
//!   transports, to every consumer group).
//!
//! Every driver implements every operation. A combination the transport
//! cannot express fails with [`QueueError::NotSupported`] rather than
//! degrading silently.
//!
//! [`QueueError::NotSupported`]: crate::QueueError::NotSupported

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{Delivery, Message, Meta};
use crate::wait::Next;

/// Sending side of a transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Unicast: deliver `msg` to exactly one consumer of `subject`.
    ///
    /// Returns the message id, generated when `msg` carried none.
    async fn enqueue(&self, subject: &str, msg: Message) -> Result<String>;

    /// Broadcast: deliver `msg` to every subscriber of `subject`.
    ///
    /// Returns the message id, generated when `msg` carried none.
    async fn publish(&self, subject: &str, msg: Message) -> Result<String>;

    /// Release pooled connections. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Receiving side of a transport.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Unicast: wait at most `timeout` for the next message on `subject`.
    ///
    /// Expiry yields [`QueueError::Timeout`](crate::QueueError::Timeout).
    async fn dequeue_raw(&self, subject: &str, group: &str, timeout: Duration) -> Result<Delivery>;

    /// Broadcast: start receiving messages published to `subject`.
    ///
    /// `group` names the consumer group on transports that track progress
    /// per group; others ignore it.
    async fn subscribe(&self, subject: &str, group: &str) -> Result<Box<dyn Subscriber>>;

    /// Release pooled connections. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Typed unicast receive on top of [`Consumer::dequeue_raw`].
#[async_trait]
pub trait ConsumerExt: Consumer {
    /// Wait at most `timeout`, unmarshal the body into `dst`, and return the
    /// delivery metadata.
    async fn dequeue<M>(&self, subject: &str, group: &str, timeout: Duration, dst: &mut M) -> Result<Meta>
    where
        M: prost::Message + Send,
    {
        let delivery = self.dequeue_raw(subject, group, timeout).await?;
        delivery.decode_into(dst)?;
        Ok(delivery.meta)
    }
}

impl<C: Consumer + ?Sized> ConsumerExt for C {}

/// A live broadcast subscription.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Wait at most `timeout` for the next message.
    async fn next(&self, timeout: Duration) -> Next<Message>;

    /// Like [`Subscriber::next`], with expiry reported as
    /// [`QueueError::Timeout`](crate::QueueError::Timeout).
    async fn next_message(&self, timeout: Duration) -> Result<Message> {
        self.next(timeout).await.into_result()
    }

    /// End the subscription. Unblocks a concurrent [`Subscriber::next`].
    async fn close(&self) -> Result<()>;
}

/// A transport that can open publishers and consumers from a DSN.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open_publisher(&self, dsn: &str) -> Result<PublisherPtr>;

    async fn open_consumer(&self, dsn: &str) -> Result<ConsumerPtr>;
}

/// Shared publisher handle.
pub type PublisherPtr = Arc<dyn Publisher>;

/// Shared consumer handle.
pub type ConsumerPtr = Arc<dyn Consumer>;
