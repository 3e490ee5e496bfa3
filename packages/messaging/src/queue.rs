//! Per-isolate messaging endpoint.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{MessagingError, Result};
use crate::message::{encode_payload, IsolateId, Message, MessageType, Response, ReturnAddress};
use crate::transport::Transport;

/// An isolate's view of the message transport.
///
/// `MessageQueue` stamps outgoing messages with ids and a return address,
/// tracks which message types this isolate has reserved, and implements the
/// synchronous request/response exchange on top of the raw transport.
///
/// # Example
///
/// ```ignore
/// let queue = MessageQueue::new(IsolateId::EXECUTIVE, transport.clone());
/// let request = queue.new_outgoing("lifecycle/pause", Bytes::new());
/// let reply = queue.send_sync(isolate, request, Duration::from_secs(1)).await?;
/// ```
pub struct MessageQueue {
    isolate: IsolateId,
    transport: Arc<dyn Transport>,
    next_message_id: AtomicU32,
    next_request_id: AtomicU32,
    reserved: Mutex<HashSet<MessageType>>,
}

impl MessageQueue {
    pub fn new(isolate: IsolateId, transport: Arc<dyn Transport>) -> Self {
        Self {
            isolate,
            transport,
            next_message_id: AtomicU32::new(0),
            next_request_id: AtomicU32::new(0),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// The isolate this endpoint belongs to.
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build a new request-style message with a fresh request id and a
    /// return type unique to that request.
    pub fn new_outgoing(&self, message_type: impl Into<MessageType>, payload: Bytes) -> Message {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let return_type = MessageType::new(format!("<response-{}-{}>", self.isolate, request_id));
        Message::new(
            message_id,
            request_id,
            ReturnAddress {
                isolate: self.isolate,
                return_type,
            },
            message_type.into(),
            payload,
        )
    }

    /// Like [`MessageQueue::new_outgoing`], with a JSON-encoded payload.
    pub fn new_outgoing_json<T: Serialize>(
        &self,
        message_type: impl Into<MessageType>,
        value: &T,
    ) -> Result<Message> {
        Ok(self.new_outgoing(message_type, encode_payload(value)?))
    }

    /// Build the response to `request`.
    ///
    /// The response keeps the request's type and request id and is addressed
    /// to the request's return address.
    pub fn new_response(&self, request: &Message, payload: Bytes) -> Response {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::new(
            message_id,
            request.request_id(),
            ReturnAddress {
                isolate: self.isolate,
                return_type: request.message_type().clone(),
            },
            request.message_type().clone(),
            payload,
        );
        Response {
            to: request.sender().clone(),
            message,
        }
    }

    /// Like [`MessageQueue::new_response`], with a JSON-encoded payload.
    pub fn new_response_json<T: Serialize>(&self, request: &Message, value: &T) -> Result<Response> {
        Ok(self.new_response(request, encode_payload(value)?))
    }

    /// Enqueue a message for `target` and return without waiting.
    pub async fn send_async(&self, target: IsolateId, message: Message) -> Result<()> {
        let message_type = message.message_type().clone();
        tracing::trace!(from = %self.isolate, to = %target, %message_type, "send");
        self.transport.send(target, &message_type, message).await
    }

    /// Deliver a response to its return address.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let Response { to, message } = response;
        self.transport
            .send(to.isolate, &to.return_type, message)
            .await
    }

    /// Send a request and wait for the correlated response.
    ///
    /// Responses whose request id does not match are discarded. The whole
    /// exchange is bounded by a single deadline; the response queue is torn
    /// down on every exit path.
    pub async fn send_sync(
        &self,
        target: IsolateId,
        message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let request_id = message.request_id();
        let request_type = message.message_type().clone();
        let return_type = message.sender().return_type.clone();

        let _response_queue = QueueReservation::open(&*self.transport, self.isolate, &return_type)?;
        self.send_async(target, message).await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MessagingError::TimedOut(request_type));
            }

            let reply = self
                .transport
                .wait_for(self.isolate, &return_type, remaining)
                .await
                .map_err(|e| match e {
                    MessagingError::TimedOut(_) => MessagingError::TimedOut(request_type.clone()),
                    other => other,
                })?;

            if reply.request_id() == request_id {
                return Ok(reply);
            }
            tracing::debug!(
                expected = request_id,
                got = reply.request_id(),
                %request_type,
                "discarding stale response"
            );
        }
    }

    /// Register interest in a message type so its queue exists before the
    /// first `receive`.
    pub fn reserve(&self, message_type: &MessageType) -> Result<()> {
        let mut reserved = self.reserved();
        if reserved.contains(message_type) {
            return Ok(());
        }
        self.transport.create_queue(self.isolate, message_type)?;
        reserved.insert(message_type.clone());
        Ok(())
    }

    /// Release a reservation made with [`MessageQueue::reserve`].
    pub fn unreserve(&self, message_type: &MessageType) {
        if self.reserved().remove(message_type) {
            self.transport.destroy_queue(self.isolate, message_type);
        }
    }

    pub fn is_reserved(&self, message_type: &MessageType) -> bool {
        self.reserved().contains(message_type)
    }

    /// Wait up to `timeout` for a message of a reserved type.
    pub async fn receive(&self, message_type: &MessageType, timeout: Duration) -> Result<Message> {
        if !self.is_reserved(message_type) {
            return Err(MessagingError::NotReserved {
                isolate: self.isolate,
                message_type: message_type.clone(),
            });
        }
        self.transport
            .wait_for(self.isolate, message_type, timeout)
            .await
    }

    fn reserved(&self) -> MutexGuard<'_, HashSet<MessageType>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        let reserved = std::mem::take(&mut *self.reserved());
        for message_type in reserved {
            self.transport.destroy_queue(self.isolate, &message_type);
        }
    }
}

/// A queue that exists for the lifetime of the guard.
struct QueueReservation<'a> {
    transport: &'a dyn Transport,
    owner: IsolateId,
    message_type: &'a MessageType,
}

impl<'a> QueueReservation<'a> {
    fn open(
        transport: &'a dyn Transport,
        owner: IsolateId,
        message_type: &'a MessageType,
    ) -> Result<Self> {
        transport.create_queue(owner, message_type)?;
        Ok(Self {
            transport,
            owner,
            message_type,
        })
    }
}

impl Drop for QueueReservation<'_> {
    fn drop(&mut self) {
        self.transport.destroy_queue(self.owner, self.message_type);
    }
}
