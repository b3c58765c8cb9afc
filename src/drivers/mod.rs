//! Transport drivers.
//!
//! Each driver module exposes a `register` function adding it to a
//! [`DriverRegistry`](crate::registry::DriverRegistry) under its name.

#[cfg(feature = "channel")]
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "redis")]
pub mod redis;
