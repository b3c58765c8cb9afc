//! Shared test fixtures.

use crate::message::Message;

/// Payload type used across tests.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Something {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub age: i32,
}

impl prost::Name for Something {
    const NAME: &'static str = "Something";
    const PACKAGE: &'static str = "relayq.testdata";
}

pub fn something() -> Something {
    Something {
        name: "something".to_string(),
        age: 11,
    }
}

/// Build a message whose body is the raw encoding of `payload`.
pub fn make_message(payload: &Something) -> Message {
    use prost::Message as _;
    Message::new(payload.encode_to_vec())
}
