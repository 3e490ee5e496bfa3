//! Executive-side lifecycle calls.

use std::sync::Arc;
use std::time::Duration;

use jump_messaging::{IsolateId, MessageQueue};
use serde::Serialize;

use crate::app::{AppId, AppState, Application};
use crate::error::{IsolateError, Result};
use crate::protocol::{self, AppRequest, DestroyRequest, LifecycleReply, StartRequest};

/// Drives applications in other isolates over request/response messages.
///
/// Every call is bounded by the client's timeout; expiry surfaces as a
/// messaging timeout (see [`IsolateError::is_timeout`]).
#[derive(Clone)]
pub struct LifecycleClient {
    queue: Arc<MessageQueue>,
    timeout: Duration,
}

impl LifecycleClient {
    pub fn new(queue: Arc<MessageQueue>, timeout: Duration) -> Self {
        Self { queue, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn start_app(
        &self,
        isolate: IsolateId,
        app: Application,
        args: Vec<String>,
    ) -> Result<AppId> {
        match self
            .request(isolate, protocol::START, &StartRequest { app, args })
            .await?
        {
            LifecycleReply::Started { app_id } => Ok(app_id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn pause_app(&self, isolate: IsolateId, app_id: AppId) -> Result<AppState> {
        self.state_request(isolate, protocol::PAUSE, &AppRequest { app_id })
            .await
    }

    pub async fn resume_app(&self, isolate: IsolateId, app_id: AppId) -> Result<AppState> {
        self.state_request(isolate, protocol::RESUME, &AppRequest { app_id })
            .await
    }

    pub async fn destroy_app(
        &self,
        isolate: IsolateId,
        app_id: AppId,
        force: bool,
    ) -> Result<AppState> {
        self.state_request(isolate, protocol::DESTROY, &DestroyRequest { app_id, force })
            .await
    }

    async fn state_request<T: Serialize>(
        &self,
        isolate: IsolateId,
        message_type: &str,
        request: &T,
    ) -> Result<AppState> {
        match self.request(isolate, message_type, request).await? {
            LifecycleReply::State { state, .. } => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    async fn request<T: Serialize>(
        &self,
        isolate: IsolateId,
        message_type: &str,
        request: &T,
    ) -> Result<LifecycleReply> {
        let message = self.queue.new_outgoing_json(message_type, request)?;
        let reply = self.queue.send_sync(isolate, message, self.timeout).await?;
        reply.decode::<LifecycleReply>()?.into_result()
    }
}

fn unexpected(reply: LifecycleReply) -> IsolateError {
    IsolateError::Rejected {
        kind: crate::error::FailureKind::Other,
        message: format!("unexpected reply: {reply:?}"),
    }
}
