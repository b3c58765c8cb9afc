//! Driver registry and facade.
//!
//! Drivers register once at startup into an explicit [`DriverRegistry`];
//! publishers and consumers are then opened by driver name and DSN.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{QueueError, Result};
use crate::queue::{ConsumerPtr, Driver, PublisherPtr};

/// Name → driver mapping.
///
/// Mutated only while wiring; share it behind `Arc` afterwards.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every driver compiled into this build.
    pub fn with_default_drivers() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "channel")]
        crate::drivers::channel::register(&mut registry);
        #[cfg(feature = "redis")]
        crate::drivers::redis::register(&mut registry);
        #[cfg(feature = "kafka")]
        crate::drivers::kafka::register(&mut registry);
        registry
    }

    /// Make a driver available under `name`.
    ///
    /// # Panics
    ///
    /// If `name` is already registered. Registration is wiring, so a
    /// duplicate is a programming error rather than a runtime condition.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        if self.drivers.contains_key(&name) {
            panic!("queue: Register called twice for driver {name}");
        }
        debug!(driver = %name, "Registered queue driver");
        self.drivers.insert(name, driver);
    }

    /// Sorted names of the registered drivers.
    pub fn drivers(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    fn driver(&self, name: &str) -> Result<&Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .ok_or_else(|| QueueError::DriverNotFound(name.to_string()))
    }

    /// Open a publisher with the named driver.
    pub async fn new_publisher(&self, driver: &str, dsn: &str) -> Result<PublisherPtr> {
        self.driver(driver)?.open_publisher(dsn).await
    }

    /// Open a consumer with the named driver.
    pub async fn new_consumer(&self, driver: &str, dsn: &str) -> Result<ConsumerPtr> {
        self.driver(driver)?.open_consumer(dsn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Delivery, Message};
    use crate::queue::{Consumer, Publisher, Subscriber};
    use crate::wait::Next;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records which DSNs it was asked to open.
    #[derive(Default)]
    struct RecordingDriver {
        opened: AtomicUsize,
    }

    struct Nothing;

    #[async_trait]
    impl Publisher for Nothing {
        async fn enqueue(&self, _: &str, _: Message) -> Result<String> {
            Ok(String::new())
        }
        async fn publish(&self, _: &str, _: Message) -> Result<String> {
            Ok(String::new())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Consumer for Nothing {
        async fn dequeue_raw(&self, _: &str, _: &str, _: Duration) -> Result<Delivery> {
            Err(QueueError::Timeout)
        }
        async fn subscribe(&self, _: &str, _: &str) -> Result<Box<dyn Subscriber>> {
            Ok(Box::new(Nothing))
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Subscriber for Nothing {
        async fn next(&self, _: Duration) -> Next<Message> {
            Next::TimedOut
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        async fn open_publisher(&self, dsn: &str) -> Result<PublisherPtr> {
            if dsn.is_empty() {
                return Err(QueueError::InvalidDsn(dsn.to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Nothing))
        }
        async fn open_consumer(&self, _dsn: &str) -> Result<ConsumerPtr> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Nothing))
        }
    }

    #[test]
    fn test_drivers_sorted() {
        let mut registry = DriverRegistry::new();
        registry.register("redis", Arc::new(RecordingDriver::default()));
        registry.register("kafka", Arc::new(RecordingDriver::default()));
        registry.register("channel", Arc::new(RecordingDriver::default()));

        assert_eq!(registry.drivers(), vec!["channel", "kafka", "redis"]);
    }

    #[test]
    #[should_panic(expected = "Register called twice for driver redis")]
    fn test_duplicate_registration_panics() {
        let mut registry = DriverRegistry::new();
        registry.register("redis", Arc::new(RecordingDriver::default()));
        registry.register("redis", Arc::new(RecordingDriver::default()));
    }

    #[tokio::test]
    async fn test_unknown_driver() {
        let registry = DriverRegistry::new();
        let err = registry.new_publisher("nats", "nats://localhost").await.err().unwrap();
        assert!(matches!(err, QueueError::DriverNotFound(ref name) if name == "nats"));

        let err = registry.new_consumer("nats", "nats://localhost").await.err().unwrap();
        assert!(err.to_string().contains("nats"));
    }

    #[tokio::test]
    async fn test_resolves_and_delegates() {
        let driver = Arc::new(RecordingDriver::default());
        let mut registry = DriverRegistry::new();
        registry.register("fake", driver.clone());

        registry.new_publisher("fake", "fake://a").await.unwrap();
        registry.new_consumer("fake", "fake://a").await.unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);

        let err = registry.new_publisher("fake", "").await.err().unwrap();
        assert!(err.is_configuration());
    }

    #[cfg(all(feature = "channel", feature = "redis", not(feature = "kafka")))]
    #[test]
    fn test_default_drivers() {
        assert_eq!(
            DriverRegistry::with_default_drivers().drivers(),
            vec!["channel", "redis"]
        );
    }
}
