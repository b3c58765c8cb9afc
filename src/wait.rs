//! Bounded waits for the blocking receive operations.
//!
//! Every blocking call races the transport against a timer and a close
//! signal, and resolves to exactly one [`Next`] outcome.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{QueueError, Result};

/// Outcome of a bounded wait.
#[derive(Debug)]
pub enum Next<T> {
    /// The transport produced a value in time.
    Message(T),
    /// The transport failed, or the waiter was closed.
    Failed(QueueError),
    /// The timer fired first.
    TimedOut,
}

impl<T> Next<T> {
    /// Collapse into a `Result`, mapping [`Next::TimedOut`] to [`QueueError::Timeout`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Next::Message(value) => Ok(value),
            Next::Failed(err) => Err(err),
            Next::TimedOut => Err(QueueError::Timeout),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Next::TimedOut)
    }
}

impl<T> From<Result<T>> for Next<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Next::Message(value),
            Err(QueueError::Timeout) => Next::TimedOut,
            Err(err) => Next::Failed(err),
        }
    }
}

/// One-shot close signal observed by in-flight waits.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Trigger the signal. Returns false if it was already triggered.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|closed| !std::mem::replace(closed, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Shutdown::trigger`] has been called.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` only errors after drop.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Race `fut` against `timeout` and `shutdown`.
///
/// Never waits longer than `timeout`. A transport-level
/// [`QueueError::Timeout`] is reported as [`Next::TimedOut`] as well.
pub async fn race<T, F>(timeout: Duration, shutdown: &Shutdown, fut: F) -> Next<T>
where
    F: Future<Output = Result<T>>,
{
    if shutdown.is_triggered() {
        return Next::Failed(QueueError::Closed);
    }

    tokio::select! {
        biased;
        _ = shutdown.triggered() => Next::Failed(QueueError::Closed),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(result) => result.into(),
            Err(_) => Next::TimedOut,
        },
    }
}
