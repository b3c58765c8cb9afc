//! Connection string parsing.
//!
//! DSN format: `scheme://[user:pass@]host[,host2,...][/db]?key=value&...`
//!
//! All timeout options are in milliseconds. A value of `0` means unbounded
//! for read/write/idle timeouts.
//!
//! | key            | default |
//! |----------------|---------|
//! | maxIdle        | 1       |
//! | maxActive      | 1       |
//! | connectTimeout | 3000    |
//! | readTimeout    | 0       |
//! | writeTimeout   | 0       |
//! | idleTimeout    | 0       |
//! | ttl            | 3000    |
//! | debug          | false   |
//! | broker_version | 1.0.0 (log transports only) |

use std::time::Duration;

use crate::error::{QueueError, Result};

mod version;

pub use version::{KafkaVersion, BROKER_VERSION_KEY, SUPPORTED_VERSIONS};

const DEFAULT_MAX_IDLE: usize = 1;
const DEFAULT_MAX_ACTIVE: usize = 1;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
const DEFAULT_TTL_MS: u64 = 3000;

/// Which transport-specific option keys a driver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProfile {
    /// Pooled store transports (redis, channel).
    Store,
    /// Log-structured brokers (kafka); additionally accepts `broker_version`.
    Log,
}

/// A connection string split into its parts, options still untyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub hosts: Vec<String>,
    /// Path after the host list without the leading slash (redis db index).
    pub path: Option<String>,
    pub query: Vec<(String, String)>,
}

impl Dsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| QueueError::InvalidDsn(format!("missing scheme in {dsn:?}")))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (userinfo, location) = match location.rsplit_once('@') {
            Some((userinfo, location)) => (Some(userinfo), location),
            None => (None, location),
        };

        let (hosts, path) = match location.split_once('/') {
            Some((hosts, path)) => (hosts, Some(path)),
            None => (location, None),
        };

        let hosts: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(QueueError::InvalidDsn(format!("no host in {dsn:?}")));
        }

        let (username, password) = match userinfo {
            Some(info) => {
                let (user, pass) = match info.split_once(':') {
                    Some((user, pass)) => (user, Some(pass)),
                    None => (info, None),
                };
                (non_empty(user), pass.and_then(non_empty))
            }
            None => (None, None),
        };

        let query = query
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Ok(Self {
            scheme: scheme.to_string(),
            username,
            password,
            hosts,
            path: path.and_then(non_empty),
            query,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Typed connection options shared by all drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub dsn: Dsn,
    pub max_idle: usize,
    pub max_active: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    /// Idle age after which a borrowed connection is probed before use.
    pub ttl: Duration,
    pub debug: bool,
    /// Only set for [`TransportProfile::Log`].
    pub broker_version: Option<KafkaVersion>,
}

impl ConnectionOptions {
    /// Parse a DSN, rejecting any option key `profile` does not know.
    pub fn parse(dsn: &str, profile: TransportProfile) -> Result<Self> {
        let dsn = Dsn::parse(dsn)?;

        let mut opts = Self {
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            debug: false,
            broker_version: match profile {
                TransportProfile::Log => Some(KafkaVersion::DEFAULT),
                TransportProfile::Store => None,
            },
            dsn: dsn.clone(),
        };

        for (key, value) in &dsn.query {
            match key.as_str() {
                "maxIdle" => opts.max_idle = parse_number(key, value)?,
                "maxActive" => {
                    opts.max_active = parse_number(key, value)?;
                    if opts.max_active == 0 {
                        return Err(QueueError::invalid_option(key, value));
                    }
                }
                "connectTimeout" => opts.connect_timeout = parse_millis(key, value)?,
                "readTimeout" => opts.read_timeout = parse_millis(key, value)?,
                "writeTimeout" => opts.write_timeout = parse_millis(key, value)?,
                "idleTimeout" => opts.idle_timeout = parse_millis(key, value)?,
                "ttl" => opts.ttl = parse_millis(key, value)?,
                "debug" => opts.debug = parse_bool(value).unwrap_or(false),
                BROKER_VERSION_KEY if profile == TransportProfile::Log => {
                    opts.broker_version = Some(KafkaVersion::parse(value)?);
                }
                _ => {
                    return Err(QueueError::UnsupportedOption {
                        key: key.clone(),
                        value: value.clone(),
                    })
                }
            }
        }

        Ok(opts)
    }

    pub fn hosts(&self) -> &[String] {
        &self.dsn.hosts
    }

    /// Pool size, never below one.
    pub fn pool_size(&self) -> usize {
        self.max_active.max(1)
    }

    /// Idle connections kept by the pool, never above [`Self::pool_size`].
    pub fn idle_limit(&self) -> usize {
        self.max_idle.min(self.pool_size())
    }
}

/// `None` for the "unbounded" zero duration.
pub fn bounded(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| QueueError::invalid_option(key, value))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| QueueError::invalid_option(key, value))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
