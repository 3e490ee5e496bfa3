//! Error types for isolate messaging.

use thiserror::Error;

use crate::message::{IsolateId, MessageType};

/// Errors that can occur while sending or receiving messages.
///
/// `TimedOut` is an expected outcome of any bounded wait and is kept apart
/// from the transport failures, which are fatal to the call that hit them.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// No message of the requested type arrived before the deadline.
    #[error("timed out waiting for message of type {0}")]
    TimedOut(MessageType),

    /// `receive` was called for a type the endpoint never reserved.
    #[error("message type {message_type} is not reserved by isolate {isolate}")]
    NotReserved {
        isolate: IsolateId,
        message_type: MessageType,
    },

    /// The target isolate has no queue for the message type.
    #[error("no queue for message type {message_type} in isolate {isolate}")]
    NoSuchQueue {
        isolate: IsolateId,
        message_type: MessageType,
    },

    /// The target queue cannot accept more messages.
    #[error("queue for message type {message_type} in isolate {isolate} is full")]
    QueueFull {
        isolate: IsolateId,
        message_type: MessageType,
    },

    /// The queue was destroyed while a receiver was waiting on it.
    #[error("queue for message type {0} was closed")]
    QueueClosed(MessageType),

    /// A message type is already claimed by the other dispatch style.
    #[error("message type {message_type} {reason}")]
    DispatcherTypeConflict {
        message_type: MessageType,
        reason: &'static str,
    },

    /// A payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// An I/O error occurred in the backing channel.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MessagingError {
    /// Whether this error is a timeout rather than a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MessagingError::TimedOut(_))
    }

    /// Whether this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MessagingError::NoSuchQueue { .. }
                | MessagingError::QueueFull { .. }
                | MessagingError::QueueClosed(_)
                | MessagingError::Io(_)
        )
    }
}

/// Result type alias for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
