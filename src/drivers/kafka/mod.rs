//! Kafka transport.
//!
//! Broadcast only: `publish` produces to topic `subject` keyed by message
//! id, and each consumer group reads every record from its committed offset.
//! Unicast operations fail with [`QueueError::NotSupported`].
//!
//! Records carry the full envelope as their value. When the broker is at
//! least 0.11, message options are mirrored into record headers so that
//! non-envelope-aware consumers can still read them.
//!
//! [`QueueError::NotSupported`]: crate::QueueError::NotSupported

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;

use crate::dsn::{bounded, ConnectionOptions, KafkaVersion, TransportProfile};
use crate::error::Result;
use crate::queue::{ConsumerPtr, Driver, PublisherPtr};
use crate::registry::DriverRegistry;

mod consumer;
mod producer;

pub use consumer::{KafkaConsumer, KafkaSubscriber, SubscriberState};
pub use producer::KafkaProducer;

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "kafka";

/// Produce timeout when `writeTimeout` is unbounded.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Add the Kafka driver to `registry`.
pub fn register(registry: &mut DriverRegistry) {
    registry.register(DRIVER_NAME, Arc::new(KafkaDriver));
}

/// Opens [`KafkaProducer`]s and [`KafkaConsumer`]s.
pub struct KafkaDriver;

#[async_trait]
impl Driver for KafkaDriver {
    async fn open_publisher(&self, dsn: &str) -> Result<PublisherPtr> {
        let opts = ConnectionOptions::parse(dsn, TransportProfile::Log)?;
        Ok(Arc::new(KafkaProducer::new(&opts)?))
    }

    async fn open_consumer(&self, dsn: &str) -> Result<ConsumerPtr> {
        let opts = ConnectionOptions::parse(dsn, TransportProfile::Log)?;
        Ok(Arc::new(KafkaConsumer::new(opts)?))
    }
}

fn broker_version(opts: &ConnectionOptions) -> KafkaVersion {
    opts.broker_version.unwrap_or_default()
}

/// True when the broker stores record headers.
fn supports_headers(opts: &ConnectionOptions) -> bool {
    broker_version(opts).is_at_least(KafkaVersion::V0_11_0_0)
}

/// Build the settings shared by producers and consumers.
fn build_base_config(opts: &ConnectionOptions) -> ClientConfig {
    let version = broker_version(opts);

    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", opts.hosts().join(","));
    config.set("broker.version.fallback", version.to_string());
    // ApiVersionRequest only exists from 0.10 on.
    config.set(
        "api.version.request",
        if version.is_at_least(KafkaVersion::V0_10_0_0) { "true" } else { "false" },
    );
    config.set(
        "socket.connection.setup.timeout.ms",
        opts.connect_timeout.as_millis().max(1000).to_string(),
    );

    if let Some(idle) = bounded(opts.idle_timeout) {
        config.set("connections.max.idle.ms", idle.as_millis().to_string());
    }
    if let (Some(user), Some(pass)) = (&opts.dsn.username, &opts.dsn.password) {
        config.set("security.protocol", "SASL_PLAINTEXT");
        config.set("sasl.mechanism", "PLAIN");
        config.set("sasl.username", user);
        config.set("sasl.password", pass);
    }
    if opts.debug {
        config.set("debug", "broker,topic,msg,cgrp");
    }

    config
}

/// Build a ClientConfig for producers.
fn build_producer_config(opts: &ConnectionOptions) -> ClientConfig {
    let mut config = build_base_config(opts);
    config.set("acks", "all");
    config.set("message.timeout.ms", send_timeout(opts).as_millis().to_string());
    config
}

/// Build a ClientConfig for a consumer group member.
fn build_consumer_config(opts: &ConnectionOptions, group: &str) -> ClientConfig {
    let mut config = build_base_config(opts);
    config.set("group.id", group);
    config.set("enable.auto.commit", "false");
    config.set("auto.offset.reset", "earliest");
    if let Some(read) = bounded(opts.read_timeout) {
        config.set("fetch.wait.max.ms", read.as_millis().to_string());
    }
    config
}

fn send_timeout(opts: &ConnectionOptions) -> Duration {
    bounded(opts.write_timeout).unwrap_or(DEFAULT_SEND_TIMEOUT)
}

#[cfg(test)]
mod tests;
