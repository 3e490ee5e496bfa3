//! The transport capability and its in-process implementation.
//!
//! A [`Transport`] stands in for the operating system's message queues: it
//! owns one queue per `(isolate, message type)` pair and moves whole
//! messages between them. Everything above this layer is transport
//! agnostic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{MessagingError, Result};
use crate::message::{IsolateId, Message, MessageType};

/// Default number of messages a single queue can buffer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// The OS-level message queue layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create (or add a reference to) the queue for `message_type` owned by
    /// `owner`.
    fn create_queue(&self, owner: IsolateId, message_type: &MessageType) -> Result<()>;

    /// Drop a reference to a queue; the queue goes away with its last
    /// reference and any undelivered messages are discarded.
    fn destroy_queue(&self, owner: IsolateId, message_type: &MessageType);

    /// Whether `owner` currently has a queue for `message_type`.
    fn has_queue(&self, owner: IsolateId, message_type: &MessageType) -> bool;

    /// Deliver a message to the `message_type` queue of `target`.
    async fn send(
        &self,
        target: IsolateId,
        message_type: &MessageType,
        message: Message,
    ) -> Result<()>;

    /// Wait up to `timeout` for the next message on one of `owner`'s queues.
    async fn wait_for(
        &self,
        owner: IsolateId,
        message_type: &MessageType,
        timeout: Duration,
    ) -> Result<Message>;
}

struct Queue {
    tx: mpsc::Sender<Message>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Message>>>,
    refs: usize,
}

/// A transport backed by bounded tokio channels, for isolates that live in
/// one process.
pub struct InProcessTransport {
    capacity: usize,
    queues: Mutex<HashMap<(IsolateId, MessageType), Queue>>,
}

impl InProcessTransport {
    /// Create a transport whose queues hold at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.queues().len()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<(IsolateId, MessageType), Queue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn create_queue(&self, owner: IsolateId, message_type: &MessageType) -> Result<()> {
        let mut queues = self.queues();
        queues
            .entry((owner, message_type.clone()))
            .and_modify(|q| q.refs += 1)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                tracing::trace!(isolate = %owner, %message_type, "queue created");
                Queue {
                    tx,
                    rx: Arc::new(AsyncMutex::new(rx)),
                    refs: 1,
                }
            });
        Ok(())
    }

    fn destroy_queue(&self, owner: IsolateId, message_type: &MessageType) {
        let mut queues = self.queues();
        let key = (owner, message_type.clone());
        let remove = match queues.get_mut(&key) {
            Some(queue) => {
                queue.refs -= 1;
                queue.refs == 0
            }
            None => false,
        };
        if remove {
            queues.remove(&key);
            tracing::trace!(isolate = %owner, %message_type, "queue destroyed");
        }
    }

    fn has_queue(&self, owner: IsolateId, message_type: &MessageType) -> bool {
        self.queues().contains_key(&(owner, message_type.clone()))
    }

    async fn send(
        &self,
        target: IsolateId,
        message_type: &MessageType,
        message: Message,
    ) -> Result<()> {
        let tx = self
            .queues()
            .get(&(target, message_type.clone()))
            .map(|q| q.tx.clone())
            .ok_or_else(|| MessagingError::NoSuchQueue {
                isolate: target,
                message_type: message_type.clone(),
            })?;

        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MessagingError::QueueFull {
                isolate: target,
                message_type: message_type.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => MessagingError::NoSuchQueue {
                isolate: target,
                message_type: message_type.clone(),
            },
        })
    }

    async fn wait_for(
        &self,
        owner: IsolateId,
        message_type: &MessageType,
        timeout: Duration,
    ) -> Result<Message> {
        let rx = self
            .queues()
            .get(&(owner, message_type.clone()))
            .map(|q| Arc::clone(&q.rx))
            .ok_or_else(|| MessagingError::NoSuchQueue {
                isolate: owner,
                message_type: message_type.clone(),
            })?;

        let received = tokio::time::timeout(timeout, async move {
            let mut rx = rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(MessagingError::QueueClosed(message_type.clone())),
            Err(_) => Err(MessagingError::TimedOut(message_type.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReturnAddress;
    use bytes::Bytes;

    fn message(ty: &str, n: u32) -> Message {
        Message::new(
            n,
            n,
            ReturnAddress {
                isolate: IsolateId::EXECUTIVE,
                return_type: MessageType::new("r"),
            },
            MessageType::new(ty),
            Bytes::from(n.to_string()),
        )
    }

    #[tokio::test]
    async fn send_to_missing_queue_fails() {
        let transport = InProcessTransport::default();
        let ty = MessageType::new("ping");
        let err = transport
            .send(IsolateId::new(1), &ty, message("ping", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::NoSuchQueue { .. }));
    }

    #[tokio::test]
    async fn delivery_is_fifo() {
        let transport = InProcessTransport::default();
        let owner = IsolateId::new(1);
        let ty = MessageType::new("ping");
        transport.create_queue(owner, &ty).unwrap();

        for n in 0..5 {
            transport.send(owner, &ty, message("ping", n)).await.unwrap();
        }
        for n in 0..5 {
            let m = transport
                .wait_for(owner, &ty, Duration::from_millis(50))
                .await
                .unwrap();
            assert_eq!(m.message_id(), n);
        }
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let transport = InProcessTransport::new(1);
        let owner = IsolateId::new(1);
        let ty = MessageType::new("ping");
        transport.create_queue(owner, &ty).unwrap();

        transport.send(owner, &ty, message("ping", 1)).await.unwrap();
        let err = transport
            .send(owner, &ty, message("ping", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::QueueFull { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_times_out() {
        let transport = InProcessTransport::default();
        let owner = IsolateId::new(1);
        let ty = MessageType::new("ping");
        transport.create_queue(owner, &ty).unwrap();

        let err = transport
            .wait_for(owner, &ty, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn queues_are_reference_counted() {
        let transport = InProcessTransport::default();
        let owner = IsolateId::new(3);
        let ty = MessageType::new("ping");

        transport.create_queue(owner, &ty).unwrap();
        transport.create_queue(owner, &ty).unwrap();
        transport.destroy_queue(owner, &ty);
        assert!(transport.has_queue(owner, &ty));

        transport.destroy_queue(owner, &ty);
        assert!(!transport.has_queue(owner, &ty));
        assert_eq!(transport.queue_count(), 0);
    }
}
