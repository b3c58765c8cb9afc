use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, info, warn};

use super::{build_producer_config, send_timeout, supports_headers, DRIVER_NAME};
use crate::dsn::ConnectionOptions;
use crate::error::{QueueError, Result};
use crate::message::Message;
use crate::queue::Publisher;
use crate::wait::Shutdown;

/// Produces envelopes to topics named after the subject.
pub struct KafkaProducer {
    producer: FutureProducer,
    headers: bool,
    send_timeout: Duration,
    shutdown: Shutdown,
}

impl KafkaProducer {
    pub fn new(opts: &ConnectionOptions) -> Result<Self> {
        let producer: FutureProducer = build_producer_config(opts).create()?;

        info!(
            bootstrap_servers = %opts.hosts().join(","),
            broker_version = ?opts.broker_version,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            headers: supports_headers(opts),
            send_timeout: send_timeout(opts),
            shutdown: Shutdown::new(),
        })
    }
}

/// Record headers mirroring `msg.options`.
fn option_headers(msg: &Message) -> OwnedHeaders {
    msg.options
        .iter()
        .fold(OwnedHeaders::new_with_capacity(msg.options.len()), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

#[async_trait]
impl Publisher for KafkaProducer {
    async fn enqueue(&self, _subject: &str, _msg: Message) -> Result<String> {
        Err(QueueError::not_supported(DRIVER_NAME, "enqueue"))
    }

    #[tracing::instrument(name = "kafka.publish", skip_all, fields(topic = %subject))]
    async fn publish(&self, subject: &str, mut msg: Message) -> Result<String> {
        if self.shutdown.is_triggered() {
            return Err(QueueError::Closed);
        }

        let id = msg.ensure_id();
        let payload = msg.to_bytes();

        let mut record = FutureRecord::to(subject).key(id.as_str()).payload(&payload[..]);
        if self.headers && !msg.options.is_empty() {
            record = record.headers(option_headers(&msg));
        }

        match self.producer.send(record, self.send_timeout).await {
            Ok((partition, offset)) => {
                debug!(message_id = %id, partition, offset, "Message published to Kafka");
                Ok(id)
            }
            Err((e, _)) => {
                warn!(message_id = %id, error = %e, "Failed to publish to Kafka");
                Err(e.into())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.shutdown.trigger() {
            return Ok(());
        }
        self.producer.flush(self.send_timeout)?;
        info!("Kafka producer closed");
        Ok(())
    }
}
