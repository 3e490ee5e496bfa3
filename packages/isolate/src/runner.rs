//! The isolate runner.
//!
//! An [`IsolateRunner`] connects a container to the isolate's message
//! queue: it registers a handler for each lifecycle message type, feeds
//! requests to the container, and answers on the request's return address.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use jump_messaging::{Dispatcher, IsolateId, Message, MessageHandler, MessageQueue, Registration};
use tokio::sync::Mutex as AsyncMutex;

use crate::app::{AppId, AppState};
use crate::container::AppContainer;
use crate::error::Result;
use crate::protocol;
use crate::state::IsolateState;

type SharedContainer = Arc<AsyncMutex<Box<dyn AppContainer>>>;

/// State shared between the runner and its message handler.
struct RunnerShared {
    isolate: IsolateId,
    state: Mutex<IsolateState>,
    registrations: Mutex<Vec<Registration>>,
}

impl RunnerShared {
    fn state(&self) -> MutexGuard<'_, IsolateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, to: IsolateState) {
        let mut state = self.state();
        let from = *state;
        if from == to {
            return;
        }
        if from.can_transition_to(to) {
            tracing::debug!(isolate = %self.isolate, %from, %to, "isolate state changed");
            *state = to;
        } else {
            tracing::warn!(isolate = %self.isolate, %from, %to, "ignoring invalid isolate transition");
        }
    }

    /// Derive the isolate state from its applications.
    fn follow_apps(&self, apps: &[(AppId, AppState)]) {
        let live: Vec<AppState> = apps
            .iter()
            .map(|(_, state)| *state)
            .filter(|state| *state != AppState::Destroyed)
            .collect();
        if live.contains(&AppState::Active) {
            self.transition(IsolateState::Running);
        } else if !live.is_empty() && live.iter().all(|s| *s == AppState::Paused) {
            self.transition(IsolateState::Paused);
        }
    }

    fn cancel_registrations(&self) {
        let registrations = std::mem::take(
            &mut *self
                .registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for registration in &registrations {
            registration.cancel();
        }
    }
}

struct LifecycleHandler {
    queue: Arc<MessageQueue>,
    container: SharedContainer,
    shared: Arc<RunnerShared>,
}

#[async_trait]
impl MessageHandler for LifecycleHandler {
    async fn handle_message(&self, message: Message) {
        let (reply, finished) = {
            let mut container = self.container.lock().await;
            let reply = container.handle_message(&message).await;
            self.shared.follow_apps(&container.apps());
            (reply, container.is_finished())
        };

        if finished {
            self.shared.transition(IsolateState::Destroyed);
        }

        if let Some(reply) = reply {
            let sent = match self.queue.new_response_json(&message, &reply) {
                Ok(response) => self.queue.send_response(response).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::warn!(isolate = %self.shared.isolate, error = %e, "failed to send lifecycle reply");
            }
        }

        if finished {
            tracing::info!(isolate = %self.shared.isolate, "last application gone, isolate terminated");
            self.shared.cancel_registrations();
        }
    }
}

/// Runs a container inside an isolate.
pub struct IsolateRunner {
    dispatcher: Dispatcher,
    container: SharedContainer,
    shared: Arc<RunnerShared>,
}

impl IsolateRunner {
    /// Start serving lifecycle messages for `queue`'s isolate.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(queue: Arc<MessageQueue>, container: Box<dyn AppContainer>) -> Result<Self> {
        let isolate = queue.isolate();
        let shared = Arc::new(RunnerShared {
            isolate,
            state: Mutex::new(IsolateState::Created),
            registrations: Mutex::new(Vec::new()),
        });
        let container: SharedContainer = Arc::new(AsyncMutex::new(container));
        let dispatcher = Dispatcher::new(Arc::clone(&queue));

        let handler: Arc<dyn MessageHandler> = Arc::new(LifecycleHandler {
            queue,
            container: Arc::clone(&container),
            shared: Arc::clone(&shared),
        });

        let mut registrations = Vec::with_capacity(protocol::MESSAGE_TYPES.len());
        for message_type in protocol::MESSAGE_TYPES {
            match dispatcher.register_handler(message_type, Arc::clone(&handler)) {
                Ok(registration) => registrations.push(registration),
                Err(e) => {
                    for registration in &registrations {
                        registration.cancel();
                    }
                    return Err(e.into());
                }
            }
        }
        *shared
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = registrations;

        tracing::debug!(%isolate, "isolate runner started");
        Ok(Self {
            dispatcher,
            container,
            shared,
        })
    }

    pub fn isolate(&self) -> IsolateId {
        self.shared.isolate
    }

    pub fn state(&self) -> IsolateState {
        *self.shared.state()
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        self.dispatcher.queue()
    }

    /// Snapshot of the hosted applications.
    pub async fn apps(&self) -> Vec<(AppId, AppState)> {
        self.container.lock().await.apps()
    }

    /// Stop serving messages and destroy every application.
    pub async fn shutdown(&self) {
        self.shared.cancel_registrations();
        self.container.lock().await.shutdown().await;
        self.shared.transition(IsolateState::Destroyed);
        tracing::info!(isolate = %self.shared.isolate, "isolate terminated");
    }

    /// Stop serving messages without running application cleanup.
    pub fn abort(&self) {
        self.shared.cancel_registrations();
        self.shared.transition(IsolateState::Destroyed);
    }
}
