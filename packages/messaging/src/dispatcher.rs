//! Handler-based message dispatch.
//!
//! A [`Dispatcher`] runs at most one listener task per message type. The
//! listener receives from the isolate's queue and hands each message to every
//! handler registered for that type. A listener exits on its own once its
//! last handler has been cancelled.
//!
//! A message type can alternatively be claimed for direct use through
//! [`Dispatcher::create_receive_queue`]; the two styles are mutually
//! exclusive per type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{MessagingError, Result};
use crate::message::{Message, MessageType};
use crate::queue::MessageQueue;

/// How long a listener blocks before rechecking whether it still has
/// handlers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receives messages of the types it was registered for.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: Message);
}

type HandlerList = Vec<(u64, Arc<dyn MessageHandler>)>;

/// Listener state for one message type.
struct Listener {
    message_type: MessageType,
    handlers: Mutex<HandlerList>,
    /// Set when the listener gave up on a receive error.
    failed: AtomicBool,
}

impl Listener {
    fn handlers(&self) -> MutexGuard<'_, HandlerList> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Slot {
    /// Claimed by a [`ReceiveQueue`].
    Direct,
    /// Served by a listener task.
    Listening(Arc<Listener>),
}

type Slots = Arc<Mutex<HashMap<MessageType, Slot>>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<MessageType, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes incoming messages to registered handlers.
pub struct Dispatcher {
    queue: Arc<MessageQueue>,
    slots: Slots,
    next_handler_id: AtomicU64,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self::with_poll_interval(queue, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(queue: Arc<MessageQueue>, poll_interval: Duration) -> Self {
        Self {
            queue,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_handler_id: AtomicU64::new(0),
            poll_interval,
        }
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Register `handler` for `message_type`, starting a listener if none is
    /// running for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_handler(
        &self,
        message_type: impl Into<MessageType>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Registration> {
        let message_type = message_type.into();
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);

        let mut slots = lock_slots(&self.slots);
        let existing = match slots.get(&message_type) {
            Some(Slot::Direct) => {
                return Err(MessagingError::DispatcherTypeConflict {
                    message_type,
                    reason: "is already in direct use",
                })
            }
            Some(Slot::Listening(listener)) => Some(Arc::clone(listener)),
            None => None,
        };
        let listener = match existing {
            Some(listener) => listener,
            None => {
                self.queue.reserve(&message_type)?;
                let listener = Arc::new(Listener {
                    message_type: message_type.clone(),
                    handlers: Mutex::new(Vec::new()),
                    failed: AtomicBool::new(false),
                });
                slots.insert(message_type.clone(), Slot::Listening(Arc::clone(&listener)));
                tokio::spawn(listen(
                    Arc::clone(&self.queue),
                    Arc::clone(&self.slots),
                    Arc::clone(&listener),
                    self.poll_interval,
                ));
                tracing::debug!(isolate = %self.queue.isolate(), %message_type, "listener started");
                listener
            }
        };

        // Added while the slot lock is held so a new listener cannot exit
        // before it sees the handler.
        listener.handlers().push((id, handler));
        drop(slots);

        Ok(Registration {
            listener,
            id,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Claim `message_type` for direct, blocking receives.
    pub fn create_receive_queue(&self, message_type: impl Into<MessageType>) -> Result<ReceiveQueue> {
        let message_type = message_type.into();
        let mut slots = lock_slots(&self.slots);
        if let Some(slot) = slots.get(&message_type) {
            let reason = match slot {
                Slot::Listening(_) => "already has a handler registered",
                Slot::Direct => "is already in direct use",
            };
            return Err(MessagingError::DispatcherTypeConflict {
                message_type,
                reason,
            });
        }

        self.queue.reserve(&message_type)?;
        slots.insert(message_type.clone(), Slot::Direct);
        Ok(ReceiveQueue {
            queue: Arc::clone(&self.queue),
            slots: Arc::clone(&self.slots),
            message_type,
            closed: AtomicBool::new(false),
        })
    }

    /// Whether a listener is currently serving `message_type`.
    pub fn is_listening(&self, message_type: &MessageType) -> bool {
        matches!(
            lock_slots(&self.slots).get(message_type),
            Some(Slot::Listening(_))
        )
    }
}

async fn listen(
    queue: Arc<MessageQueue>,
    slots: Slots,
    listener: Arc<Listener>,
    poll_interval: Duration,
) {
    let message_type = listener.message_type.clone();
    loop {
        match queue.receive(&message_type, poll_interval).await {
            Ok(message) => {
                let handlers: Vec<_> = listener
                    .handlers()
                    .iter()
                    .map(|(_, h)| Arc::clone(h))
                    .collect();
                for handler in handlers {
                    handler.handle_message(message.clone()).await;
                }
            }
            Err(e) if e.is_timeout() => {}
            Err(e) => {
                let dropped = {
                    let mut slots = lock_slots(&slots);
                    listener.failed.store(true, Ordering::Release);
                    slots.remove(&message_type);
                    std::mem::take(&mut *listener.handlers()).len()
                };
                queue.unreserve(&message_type);
                tracing::warn!(
                    isolate = %queue.isolate(),
                    %message_type,
                    error = %e,
                    cancelled = dropped,
                    "listener failed; its registrations are cancelled"
                );
                return;
            }
        }

        let idle = {
            let mut slots = lock_slots(&slots);
            let idle = listener.handlers().is_empty();
            if idle {
                slots.remove(&message_type);
                queue.unreserve(&message_type);
            }
            idle
        };
        if idle {
            tracing::debug!(isolate = %queue.isolate(), %message_type, "listener exited");
            return;
        }
    }
}

/// Handle to a handler registration.
pub struct Registration {
    listener: Arc<Listener>,
    id: u64,
    cancelled: AtomicBool,
}

impl Registration {
    /// Remove the handler. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.listener.handlers().retain(|(id, _)| *id != self.id);
        }
    }

    /// Whether the handler no longer receives messages, either because it
    /// was cancelled or because its listener failed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.listener.failed.load(Ordering::Acquire)
    }

    pub fn message_type(&self) -> &MessageType {
        &self.listener.message_type
    }
}

/// A message type claimed for direct use.
///
/// Closing the queue, explicitly or by dropping it, frees the type.
pub struct ReceiveQueue {
    queue: Arc<MessageQueue>,
    slots: Slots,
    message_type: MessageType,
    closed: AtomicBool,
}

impl ReceiveQueue {
    pub async fn receive(&self, timeout: Duration) -> Result<Message> {
        self.queue.receive(&self.message_type, timeout).await
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slots = lock_slots(&self.slots);
        slots.remove(&self.message_type);
        self.queue.unreserve(&self.message_type);
    }
}

impl Drop for ReceiveQueue {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::IsolateId;
    use crate::transport::InProcessTransport;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl MessageHandler for Forward {
        async fn handle_message(&self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    fn setup() -> (Arc<MessageQueue>, Dispatcher) {
        let transport = Arc::new(InProcessTransport::default());
        let exec = Arc::new(MessageQueue::new(IsolateId::EXECUTIVE, transport.clone()));
        let app = Arc::new(MessageQueue::new(IsolateId::new(1), transport));
        let dispatcher = Dispatcher::with_poll_interval(app, Duration::from_millis(10));
        (exec, dispatcher)
    }

    #[tokio::test]
    async fn every_handler_sees_the_message() {
        let (exec, dispatcher) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _a = dispatcher
            .register_handler("ping", Arc::new(Forward(tx.clone())))
            .unwrap();
        let _b = dispatcher
            .register_handler("ping", Arc::new(Forward(tx)))
            .unwrap();

        let message = exec.new_outgoing("ping", Bytes::from_static(b"x"));
        exec.send_async(IsolateId::new(1), message).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn direct_and_handler_use_conflict() {
        let (_, dispatcher) = setup();
        let (tx, _rx) = mpsc::unbounded_channel();

        let _direct = dispatcher.create_receive_queue("direct").unwrap();
        let err = dispatcher
            .register_handler("direct", Arc::new(Forward(tx.clone())))
            .err()
            .unwrap();
        assert!(matches!(err, MessagingError::DispatcherTypeConflict { .. }));

        let _reg = dispatcher
            .register_handler("handled", Arc::new(Forward(tx)))
            .unwrap();
        let err = dispatcher.create_receive_queue("handled").err().unwrap();
        assert!(matches!(err, MessagingError::DispatcherTypeConflict { .. }));
    }

    #[tokio::test]
    async fn closing_receive_queue_frees_type() {
        let (_, dispatcher) = setup();
        let queue = dispatcher.create_receive_queue("direct").unwrap();
        queue.close();
        queue.close();
        assert!(dispatcher.create_receive_queue("direct").is_ok());
    }

    #[tokio::test]
    async fn receive_queue_gets_messages() {
        let (exec, dispatcher) = setup();
        let queue = dispatcher.create_receive_queue("direct").unwrap();
        let message = exec.new_outgoing("direct", Bytes::from_static(b"hi"));
        exec.send_async(IsolateId::new(1), message).await.unwrap();

        let received = queue.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.payload().as_ref(), b"hi");
    }

    #[tokio::test]
    async fn listener_exits_after_last_cancel() {
        let (_, dispatcher) = setup();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ty = MessageType::new("ping");
        let registration = dispatcher
            .register_handler(ty.clone(), Arc::new(Forward(tx)))
            .unwrap();
        assert!(dispatcher.is_listening(&ty));

        registration.cancel();
        for _ in 0..100 {
            if !dispatcher.is_listening(&ty) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dispatcher.is_listening(&ty));
        assert!(!dispatcher.queue().is_reserved(&ty));
    }

    #[tokio::test]
    async fn failed_listener_cancels_its_registrations() {
        let (_, dispatcher) = setup();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ty = MessageType::new("ping");
        let registration = dispatcher
            .register_handler(ty.clone(), Arc::new(Forward(tx)))
            .unwrap();
        assert!(!registration.is_cancelled());

        // Pull the queue out from under the listener.
        dispatcher.queue().unreserve(&ty);
        for _ in 0..100 {
            if !dispatcher.is_listening(&ty) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dispatcher.is_listening(&ty));
        assert!(registration.is_cancelled());
        registration.cancel();
        assert!(dispatcher.create_receive_queue(ty).is_ok());
    }
}
