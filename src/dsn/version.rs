//! Kafka protocol versions understood by the log driver.

use std::fmt;
use std::str::FromStr;

use crate::error::{QueueError, Result};

/// Option key selecting the broker protocol version.
pub const BROKER_VERSION_KEY: &str = "broker_version";

/// A Kafka broker release, e.g. `0.10.2.1` or `2.1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KafkaVersion([u16; 4]);

impl KafkaVersion {
    pub const fn new(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self([major, minor, patch, build])
    }

    /// First release with record headers.
    pub const V0_11_0_0: Self = Self::new(0, 11, 0, 0);
    /// First release answering ApiVersion requests.
    pub const V0_10_0_0: Self = Self::new(0, 10, 0, 0);
    /// Assumed when the DSN does not name a version.
    pub const DEFAULT: Self = Self::new(1, 0, 0, 0);

    pub fn is_at_least(self, other: Self) -> bool {
        self >= other
    }

    /// Parse and validate against [`SUPPORTED_VERSIONS`].
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || QueueError::invalid_option(BROKER_VERSION_KEY, s);

        let parts = s
            .split('.')
            .map(|p| {
                if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                p.parse::<u16>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>>>()?;

        // Pre-1.0 releases use four components, later ones three.
        let version = match parts.as_slice() {
            [0, minor, patch, build] => Self::new(0, *minor, *patch, *build),
            [major, minor, patch] if *major > 0 => Self::new(*major, *minor, *patch, 0),
            _ => return Err(invalid()),
        };

        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl Default for KafkaVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for KafkaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch, build] = self.0;
        if major == 0 {
            write!(f, "{major}.{minor}.{patch}.{build}")
        } else {
            write!(f, "{major}.{minor}.{patch}")
        }
    }
}

impl FromStr for KafkaVersion {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Broker releases the log driver is known to interoperate with.
pub const SUPPORTED_VERSIONS: &[KafkaVersion] = &[
    KafkaVersion::new(0, 8, 2, 0),
    KafkaVersion::new(0, 8, 2, 1),
    KafkaVersion::new(0, 8, 2, 2),
    KafkaVersion::new(0, 9, 0, 0),
    KafkaVersion::new(0, 9, 0, 1),
    KafkaVersion::new(0, 10, 0, 0),
    KafkaVersion::new(0, 10, 0, 1),
    KafkaVersion::new(0, 10, 1, 0),
    KafkaVersion::new(0, 10, 1, 1),
    KafkaVersion::new(0, 10, 2, 0),
    KafkaVersion::new(0, 10, 2, 1),
    KafkaVersion::new(0, 10, 2, 2),
    KafkaVersion::new(0, 11, 0, 0),
    KafkaVersion::new(0, 11, 0, 1),
    KafkaVersion::new(0, 11, 0, 2),
    KafkaVersion::new(1, 0, 0, 0),
    KafkaVersion::new(1, 0, 1, 0),
    KafkaVersion::new(1, 0, 2, 0),
    KafkaVersion::new(1, 1, 0, 0),
    KafkaVersion::new(1, 1, 1, 0),
    KafkaVersion::new(2, 0, 0, 0),
    KafkaVersion::new(2, 0, 1, 0),
    KafkaVersion::new(2, 1, 0, 0),
    KafkaVersion::new(2, 2, 0, 0),
    KafkaVersion::new(2, 3, 0, 0),
    KafkaVersion::new(2, 4, 0, 0),
    KafkaVersion::new(2, 5, 0, 0),
    KafkaVersion::new(2, 6, 0, 0),
    KafkaVersion::new(2, 7, 0, 0),
    KafkaVersion::new(2, 8, 0, 0),
    KafkaVersion::new(3, 0, 0, 0),
    KafkaVersion::new(3, 1, 0, 0),
    KafkaVersion::new(3, 2, 0, 0),
    KafkaVersion::new(3, 3, 0, 0),
    KafkaVersion::new(3, 4, 0, 0),
    KafkaVersion::new(3, 5, 0, 0),
    KafkaVersion::new(3, 6, 0, 0),
    KafkaVersion::new(3, 7, 0, 0),
];
