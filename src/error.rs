//! Error types shared by every driver.

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No message arrived before the requested timeout elapsed.
    #[error("consumer get message timeout")]
    Timeout,

    #[error("queue: unknown driver {0:?}")]
    DriverNotFound(String),

    #[error("invalid connection URL: {0}")]
    InvalidDsn(String),

    #[error("unsupported connection URL option: {key}={value}")]
    UnsupportedOption { key: String, value: String },

    #[error("bad value for {key}: {value}")]
    InvalidOption { key: String, value: String },

    /// The transport cannot perform this operation at all.
    #[error("queue {transport}: {operation} not supported")]
    NotSupported {
        transport: &'static str,
        operation: &'static str,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("queue closed")]
    Closed,

    #[error("broker {0:?} not configured")]
    BrokerNotConfigured(String),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl QueueError {
    pub(crate) fn invalid_option(key: &str, value: &str) -> Self {
        Self::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[cfg_attr(not(feature = "kafka"), allow(dead_code))]
    pub(crate) fn not_supported(transport: &'static str, operation: &'static str) -> Self {
        Self::NotSupported {
            transport,
            operation,
        }
    }

    /// True when the call expired without a message.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// True for malformed DSNs and bad option values.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidDsn(_)
                | Self::UnsupportedOption { .. }
                | Self::InvalidOption { .. }
                | Self::Config(_)
        )
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// True for failures of the underlying connection or broker.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) | Self::PoolExhausted | Self::Closed => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            #[cfg(feature = "kafka")]
            Self::Kafka(_) => true,
            _ => false,
        }
    }
}
