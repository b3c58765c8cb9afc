//! Named publishers and consumers opened from [`Config`].

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::config::{BrokerType, Config};
use crate::error::{QueueError, Result};
use crate::queue::{ConsumerPtr, PublisherPtr};
use crate::registry::DriverRegistry;

/// Open brokers keyed by alias.
#[derive(Default)]
pub struct BrokerManager {
    publishers: HashMap<String, PublisherPtr>,
    consumers: HashMap<String, ConsumerPtr>,
}

impl BrokerManager {
    /// Open every enabled broker in `config`.
    ///
    /// A broker that fails to open is logged and left out; looking it up
    /// later yields [`QueueError::BrokerNotConfigured`].
    pub async fn open(registry: &DriverRegistry, config: &Config) -> Self {
        let mut manager = Self::default();

        for broker in config.enabled_brokers() {
            let opened = match broker.kind {
                BrokerType::Publisher => registry
                    .new_publisher(&broker.driver, &broker.dsn)
                    .await
                    .map(|publisher| manager.publishers.insert(broker.alias.clone(), publisher).is_some()),
                BrokerType::Consumer => registry
                    .new_consumer(&broker.driver, &broker.dsn)
                    .await
                    .map(|consumer| manager.consumers.insert(broker.alias.clone(), consumer).is_some()),
            };

            match opened {
                Ok(replaced) => {
                    if replaced {
                        warn!(alias = %broker.alias, "Duplicate broker alias, keeping the last one");
                    }
                    info!(alias = %broker.alias, driver = %broker.driver, kind = ?broker.kind, "Broker opened");
                }
                Err(e) => {
                    error!(alias = %broker.alias, driver = %broker.driver, error = %e, "Failed to open broker");
                }
            }
        }

        manager
    }

    pub fn publisher(&self, alias: &str) -> Result<PublisherPtr> {
        self.publishers
            .get(alias)
            .cloned()
            .ok_or_else(|| QueueError::BrokerNotConfigured(alias.to_string()))
    }

    pub fn consumer(&self, alias: &str) -> Result<ConsumerPtr> {
        self.consumers
            .get(alias)
            .cloned()
            .ok_or_else(|| QueueError::BrokerNotConfigured(alias.to_string()))
    }

    /// Close every broker. Failures are logged, not returned.
    pub async fn close(&self) {
        for (alias, publisher) in &self.publishers {
            if let Err(e) = publisher.close().await {
                warn!(alias = %alias, error = %e, "Failed to close publisher");
            }
        }
        for (alias, consumer) in &self.consumers {
            if let Err(e) = consumer.close().await {
                warn!(alias = %alias, error = %e, "Failed to close consumer");
            }
        }
    }
}
