//! Process-level helpers for binaries embedding the crate.

pub mod bootstrap;
