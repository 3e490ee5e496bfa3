//! The message envelope exchanged between isolates.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifier of an isolate.
///
/// Isolate `0` is reserved for the executive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsolateId(u32);

impl IsolateId {
    /// The executive's own isolate.
    pub const EXECUTIVE: IsolateId = IsolateId(0);

    /// Wrap a raw isolate number.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw isolate number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// String tag naming the kind of a message.
///
/// Queues are keyed by `(isolate, type)`, so the tag is also the name of the
/// queue a message is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Where responses to a message should be sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReturnAddress {
    /// The isolate that sent the message.
    pub isolate: IsolateId,
    /// The queue on which the sender expects responses.
    pub return_type: MessageType,
}

/// An immutable typed message.
///
/// Besides the type tag and the opaque payload, each message carries the
/// sender's message id, the request id used to correlate responses, and the
/// sender's return address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_id: u32,
    request_id: u32,
    sender: ReturnAddress,
    message_type: MessageType,
    payload: Bytes,
}

impl Message {
    pub(crate) fn new(
        message_id: u32,
        request_id: u32,
        sender: ReturnAddress,
        message_type: MessageType,
        payload: Bytes,
    ) -> Self {
        Self {
            message_id,
            request_id,
            sender,
            message_type,
            payload,
        }
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Request id; a response carries the id of the request it answers.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn sender(&self) -> &ReturnAddress {
        &self.sender
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decode a JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// A response addressed to the return address of a request.
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) to: ReturnAddress,
    pub(crate) message: Message,
}

impl Response {
    /// The return address this response will be delivered to.
    pub fn to(&self) -> &ReturnAddress {
        &self.to
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// Encode a value as a JSON payload.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolate_id_display() {
        assert_eq!(IsolateId::new(12).to_string(), "12");
        assert_eq!(IsolateId::EXECUTIVE.as_u32(), 0);
    }

    #[test]
    fn message_type_conversions() {
        let a: MessageType = "lifecycle/start".into();
        let b = MessageType::from(String::from("lifecycle/start"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "lifecycle/start");
    }

    #[test]
    fn json_payload_decodes() {
        let payload = encode_payload(&vec![1, 2, 3]).unwrap();
        let message = Message::new(
            1,
            1,
            ReturnAddress {
                isolate: IsolateId::EXECUTIVE,
                return_type: MessageType::new("<response-0-1>"),
            },
            MessageType::new("numbers"),
            payload,
        );
        let decoded: Vec<i32> = message.decode().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn garbage_payload_fails_to_decode() {
        let message = Message::new(
            1,
            1,
            ReturnAddress {
                isolate: IsolateId::EXECUTIVE,
                return_type: MessageType::new("r"),
            },
            MessageType::new("numbers"),
            Bytes::from_static(b"not json"),
        );
        assert!(message.decode::<Vec<i32>>().is_err());
    }
}
