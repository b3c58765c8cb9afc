//! Message id generation.
//!
//! Ids are UUIDv7 strings: time-ordered, globally unique, and the publish
//! timestamp can be read back out of them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{QueueError, Result};

/// Return a new globally unique message id.
pub fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}

/// Recover the publish time embedded in a message id.
///
/// Fails for ids that were not produced by [`new_message_id`].
pub fn timestamp_from_message_id(id: &str) -> Result<DateTime<Utc>> {
    let invalid = || QueueError::InvalidMessageId(id.to_string());

    let uuid = Uuid::parse_str(id).map_err(|_| invalid())?;
    if uuid.get_version_num() != 7 {
        return Err(invalid());
    }
    let (secs, nanos) = uuid.get_timestamp().ok_or_else(invalid)?.to_unix();
    DateTime::from_timestamp(secs as i64, nanos).ok_or_else(invalid)
}
