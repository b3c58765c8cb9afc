use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::{Client, Msg};
use tokio::sync::Mutex;
use tracing::info;

use crate::dsn::bounded;
use crate::error::{QueueError, Result};
use crate::message::Message;
use crate::queue::Subscriber;
use crate::wait::{race, Next, Shutdown};

/// A `SUBSCRIBE` on a dedicated pub/sub connection.
pub struct RedisSubscriber {
    subject: String,
    messages: Mutex<Option<BoxStream<'static, Msg>>>,
    shutdown: Shutdown,
}

impl RedisSubscriber {
    pub(super) async fn connect(client: &Client, subject: &str, connect_timeout: Duration) -> Result<Self> {
        let connect = async {
            let mut pubsub = client.get_async_pubsub().await?;
            pubsub.subscribe(subject).await?;
            Ok::<_, QueueError>(pubsub)
        };

        let pubsub = match bounded(connect_timeout) {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                QueueError::Transport(format!("subscribe to {subject} timed out after {limit:?}"))
            })??,
            None => connect.await?,
        };

        info!(subject, "Redis subscriber started");

        Ok(Self {
            subject: subject.to_string(),
            messages: Mutex::new(Some(pubsub.into_on_message().boxed())),
            shutdown: Shutdown::new(),
        })
    }
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn next(&self, timeout: Duration) -> Next<Message> {
        race(timeout, &self.shutdown, async {
            let mut messages = self.messages.lock().await;
            let stream = messages.as_mut().ok_or(QueueError::Closed)?;
            match stream.next().await {
                Some(msg) => Message::from_bytes(msg.get_payload_bytes()),
                None => Err(QueueError::Transport(format!(
                    "subscription to {} lost its connection",
                    self.subject
                ))),
            }
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            // A concurrent `next` releases the lock once it sees the signal.
            self.messages.lock().await.take();
            info!(subject = %self.subject, "Redis subscriber closed");
        }
        Ok(())
    }
}
