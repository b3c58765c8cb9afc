//! Typed message bodies packed as `google.protobuf.Any`.

use bytes::Bytes;
use prost::{Message as ProstMessage, Name};
use prost_types::Any;

use crate::error::Result;

/// Pack `msg` into `Any` bytes suitable for [`Message::body`](super::Message).
pub fn to_body<M: Name>(msg: &M) -> Result<Bytes> {
    let any = Any::from_msg(msg)?;
    Ok(Bytes::from(any.encode_to_vec()))
}

/// Unpack a body produced by [`to_body`], checking the type url.
pub fn from_body<M: Name + Default>(body: &[u8]) -> Result<M> {
    let any = Any::decode(body)?;
    Ok(any.to_msg::<M>()?)
}
