//! relayq - message queue client abstraction
//!
//! One publisher/consumer API over pluggable transports. Drivers register
//! into a [`DriverRegistry`] and are opened by name and DSN:
//!
//! ```no_run
//! # async fn demo() -> relayq::Result<()> {
//! use std::time::Duration;
//! use relayq::{DriverRegistry, Message};
//!
//! let registry = DriverRegistry::with_default_drivers();
//! let publisher = registry.new_publisher("redis", "redis://localhost/0?maxActive=4").await?;
//! let consumer = registry.new_consumer("redis", "redis://localhost/0").await?;
//!
//! publisher.enqueue("jobs", Message::new("payload")).await?;
//! let delivery = consumer.dequeue_raw("jobs", "workers", Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod drivers;
pub mod dsn;
pub mod error;
pub mod message;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod utils;
pub mod wait;

#[cfg(test)]
mod test_utils;

pub use error::{QueueError, Result};
pub use message::{Delivery, Message, Meta, Priority};
pub use queue::{Consumer, ConsumerExt, ConsumerPtr, Driver, Publisher, PublisherPtr, Subscriber};
pub use registry::DriverRegistry;
pub use wait::Next;
