//! # JUMP Messaging
//!
//! Isolates never share memory; the only way they talk to each other is by
//! sending typed messages through the transport described here.
//!
//! ## Layers
//!
//! - [`Transport`]: the OS-level queue layer. One queue per
//!   `(isolate, message type)`. [`InProcessTransport`] implements it with
//!   bounded tokio channels.
//! - [`MessageQueue`]: an isolate's endpoint. Stamps message ids and return
//!   addresses, keeps track of reservations, and implements the synchronous
//!   request/response exchange.
//! - [`Dispatcher`]: runs listener tasks that hand messages to registered
//!   [`MessageHandler`]s, or hands a type out for direct use as a
//!   [`ReceiveQueue`].
//!
//! ## Ordering
//!
//! Delivery is FIFO per destination queue. Nothing is promised across
//! queues.
//!
//! ## Timeouts
//!
//! Every blocking call takes an explicit timeout. Expiry is reported as
//! [`MessagingError::TimedOut`], which callers are expected to handle;
//! transport failures are reported as the other variants and are never
//! retried here.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod queue;
pub mod transport;

pub use dispatcher::{Dispatcher, MessageHandler, ReceiveQueue, Registration};
pub use error::{MessagingError, Result};
pub use message::{encode_payload, IsolateId, Message, MessageType, Response, ReturnAddress};
pub use queue::MessageQueue;
pub use transport::{InProcessTransport, Transport, DEFAULT_QUEUE_CAPACITY};

pub use bytes::Bytes;
