//! Transport-agnostic message envelope.
//!
//! Every driver puts the protobuf encoding of [`Message`] on the wire, so a
//! message produced through one transport decodes the same way through any
//! other. Transport-specific delivery details (offsets, partitions) are
//! injected into `options` under reserved, transport-prefixed keys instead
//! of extending the schema.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use prost::Message as ProstMessage;

use crate::error::Result;

pub mod body;
pub mod id;

pub use body::{from_body, to_body};
pub use id::{new_message_id, timestamp_from_message_id};

/// Option key carrying the Kafka offset of a received record.
pub const OPTION_KAFKA_OFFSET: &str = "kafka-offset";
/// Option key carrying the Kafka partition of a received record.
pub const OPTION_KAFKA_PARTITION: &str = "kafka-partition";

/// Delivery priority hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Priority {
    Priority0 = 0,
    Priority1 = 1,
    Priority2 = 2,
    Priority3 = 3,
    Priority4 = 4,
}

/// The envelope handed to and returned from every transport.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    /// Assigned by the publishing side when empty.
    #[prost(string, tag = "1")]
    pub message_id: String,
    #[prost(enumeration = "Priority", tag = "2")]
    pub priority: i32,
    /// Free-form headers.
    #[prost(map = "string, string", tag = "3")]
    pub options: HashMap<String, String>,
    /// Opaque caller payload.
    #[prost(bytes = "bytes", tag = "4")]
    pub body: Bytes,
}

impl Message {
    /// Create a message carrying `body` with default priority and no id.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.set_priority(priority);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Assign a fresh id if none is set and return the effective id.
    pub(crate) fn ensure_id(&mut self) -> String {
        if self.message_id.is_empty() {
            self.message_id = new_message_id();
        }
        self.message_id.clone()
    }

    /// Encode to the shared wire format.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// Decode from the shared wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        Ok(Self::decode(buf)?)
    }

    /// Publish time recovered from the message id, when the id carries one.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        timestamp_from_message_id(&self.message_id).ok()
    }
}

/// Delivery metadata returned by a unicast dequeue.
#[derive(Clone, Debug, PartialEq)]
pub struct Meta {
    pub message_id: String,
    pub priority: Priority,
    pub options: HashMap<String, String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Raw envelope bytes as they came off the transport.
    pub src: Bytes,
}

impl Meta {
    pub fn from_message(msg: &Message, src: Bytes) -> Self {
        Self {
            message_id: msg.message_id.clone(),
            priority: msg.priority(),
            options: msg.options.clone(),
            published_at: msg.published_at(),
            src,
        }
    }
}

/// A dequeued message split into metadata and the still-encoded body.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub meta: Meta,
    pub body: Bytes,
}

impl Delivery {
    /// Decode raw envelope bytes into a delivery.
    pub fn from_wire(src: Bytes) -> Result<Self> {
        let msg = Message::from_bytes(&src)?;
        Ok(Self {
            meta: Meta::from_message(&msg, src),
            body: msg.body,
        })
    }

    /// Unmarshal the body into `dst`, replacing its contents.
    pub fn decode_into<M: ProstMessage>(&self, dst: &mut M) -> Result<()> {
        dst.clear();
        dst.merge(self.body.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
