use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer as _, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaResult;
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, info, warn};

use super::{build_consumer_config, supports_headers, DRIVER_NAME};
use crate::dsn::ConnectionOptions;
use crate::error::{QueueError, Result};
use crate::message::{Delivery, Message, OPTION_KAFKA_OFFSET, OPTION_KAFKA_PARTITION};
use crate::queue::{Consumer, Subscriber};
use crate::wait::{race, Next, Shutdown};

/// Lifecycle of a group subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SubscriberState {
    /// Subscribed, waiting for the group to assign partitions.
    Connecting = 0,
    /// Partitions assigned, nothing delivered yet.
    JoinedGroup = 1,
    /// At least one record delivered.
    Consuming = 2,
}

/// Shared between the subscriber and its rebalance callbacks.
#[derive(Debug, Default)]
pub(super) struct StateCell(AtomicU8);

impl StateCell {
    pub(super) fn get(&self) -> SubscriberState {
        match self.0.load(Ordering::SeqCst) {
            0 => SubscriberState::Connecting,
            1 => SubscriberState::JoinedGroup,
            _ => SubscriberState::Consuming,
        }
    }

    /// Move forward to `next`. Returns true if the state changed.
    pub(super) fn advance(&self, next: SubscriberState) -> bool {
        self.0.fetch_max(next as u8, Ordering::SeqCst) < next as u8
    }
}

/// Consumer context logging group membership changes.
struct GroupContext {
    group: String,
    topic: String,
    state: Arc<StateCell>,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            info!(
                group = %self.group,
                topic = %self.topic,
                partitions = partitions.count(),
                "Kafka partitions revoked"
            );
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                self.state.advance(SubscriberState::JoinedGroup);
                info!(
                    group = %self.group,
                    topic = %self.topic,
                    partitions = partitions.count(),
                    "Kafka partitions assigned"
                );
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(e) => {
                warn!(group = %self.group, topic = %self.topic, error = %e, "Kafka rebalance failed");
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(e) = result {
            warn!(group = %self.group, error = %e, "Failed to commit offset");
        }
    }
}

/// Opens group subscriptions.
pub struct KafkaConsumer {
    opts: ConnectionOptions,
    shutdown: Shutdown,
}

impl KafkaConsumer {
    pub fn new(opts: ConnectionOptions) -> Result<Self> {
        info!(
            bootstrap_servers = %opts.hosts().join(","),
            broker_version = ?opts.broker_version,
            "Kafka consumer created"
        );
        Ok(Self {
            opts,
            shutdown: Shutdown::new(),
        })
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn dequeue_raw(&self, _subject: &str, _group: &str, _timeout: Duration) -> Result<Delivery> {
        Err(QueueError::not_supported(DRIVER_NAME, "dequeue"))
    }

    async fn subscribe(&self, subject: &str, group: &str) -> Result<Box<dyn Subscriber>> {
        if self.shutdown.is_triggered() {
            return Err(QueueError::Closed);
        }
        if group.is_empty() {
            return Err(QueueError::invalid_option("group.id", group));
        }
        Ok(Box::new(KafkaSubscriber::new(&self.opts, subject, group)?))
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            info!("Kafka consumer closed");
        }
        Ok(())
    }
}

/// One member of a consumer group reading one topic.
pub struct KafkaSubscriber {
    consumer: StreamConsumer<GroupContext>,
    state: Arc<StateCell>,
    headers: bool,
    topic: String,
    group: String,
    shutdown: Shutdown,
}

impl KafkaSubscriber {
    fn new(opts: &ConnectionOptions, topic: &str, group: &str) -> Result<Self> {
        let state = Arc::new(StateCell::default());
        let context = GroupContext {
            group: group.to_string(),
            topic: topic.to_string(),
            state: state.clone(),
        };

        let consumer: StreamConsumer<GroupContext> =
            build_consumer_config(opts, group).create_with_context(context)?;
        consumer.subscribe(&[topic])?;

        info!(topic, group, "Kafka subscriber started");

        Ok(Self {
            consumer,
            state,
            headers: supports_headers(opts),
            topic: topic.to_string(),
            group: group.to_string(),
            shutdown: Shutdown::new(),
        })
    }

    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn next(&self, timeout: Duration) -> Next<Message> {
        race(timeout, &self.shutdown, async {
            let record = self.consumer.recv().await?;
            let msg = decode_record(&record, self.headers);

            // Not committed until decoded.
            self.consumer.commit_message(&record, CommitMode::Async)?;

            if self.state.advance(SubscriberState::Consuming) {
                info!(topic = %self.topic, group = %self.group, "Kafka subscriber consuming");
            }
            debug!(
                topic = %self.topic,
                partition = record.partition(),
                offset = record.offset(),
                message_id = %msg.message_id,
                "Received message from Kafka"
            );
            Ok(msg)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            self.consumer.unsubscribe();
            info!(topic = %self.topic, group = %self.group, "Kafka subscriber closed");
        }
        Ok(())
    }
}

fn decode_record(record: &BorrowedMessage<'_>, headers_supported: bool) -> Message {
    let headers = match record.headers() {
        Some(headers) if headers_supported => headers
            .iter()
            .filter_map(|header| {
                let value = header.value?;
                Some((header.key.to_string(), String::from_utf8_lossy(value).into_owned()))
            })
            .collect(),
        _ => Vec::new(),
    };

    message_from_record(
        record.payload().unwrap_or_default(),
        record.key(),
        headers,
        record.partition(),
        record.offset(),
    )
}

/// Rebuild the envelope from a record and stamp its position.
///
/// A value that decodes as an envelope whose id matches the record key is
/// taken as is. Anything else is a foreign record: the key becomes the id,
/// the value the body and the headers the options.
pub(crate) fn message_from_record(
    payload: &[u8],
    key: Option<&[u8]>,
    headers: Vec<(String, String)>,
    partition: i32,
    offset: i64,
) -> Message {
    let envelope = Message::from_bytes(payload).ok().filter(|msg| {
        !msg.message_id.is_empty() && key.map_or(true, |key| key == msg.message_id.as_bytes())
    });

    let mut msg = envelope.unwrap_or_else(|| Message {
        message_id: key
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .unwrap_or_default(),
        options: headers.into_iter().collect(),
        body: Bytes::copy_from_slice(payload),
        ..Default::default()
    });

    msg.options.insert(OPTION_KAFKA_OFFSET.to_string(), offset.to_string());
    msg.options.insert(OPTION_KAFKA_PARTITION.to_string(), partition.to_string());
    msg
}
