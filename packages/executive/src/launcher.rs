//! Launching applications for push events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use jump_isolate::{AppId, Application, LifecycleModule};
use jump_messaging::IsolateId;
use jump_push_registry::{LifecycleAdapter, SuiteId};

/// Starts each pushed application in a fresh isolate.
pub struct IsolateLauncher {
    lifecycle: Arc<LifecycleModule>,
    launched: Mutex<Vec<(IsolateId, AppId, Application)>>,
}

impl IsolateLauncher {
    pub fn new(lifecycle: Arc<LifecycleModule>) -> Self {
        Self {
            lifecycle,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Pushed applications whose isolate is still live, oldest first.
    pub fn launched(&self) -> Vec<(IsolateId, AppId, Application)> {
        let mut launches = self.launches();
        self.prune(&mut launches);
        launches.clone()
    }

    fn prune(&self, launches: &mut Vec<(IsolateId, AppId, Application)>) {
        launches.retain(|(isolate, _, _)| {
            self.lifecycle
                .isolate_state(*isolate)
                .is_some_and(|state| !state.is_terminal())
        });
    }

    async fn start(&self, app: Application) -> jump_isolate::Result<(IsolateId, AppId)> {
        let isolate = self.lifecycle.new_isolate(None)?;
        match self
            .lifecycle
            .client()
            .start_app(isolate, app, Vec::new())
            .await
        {
            Ok(app_id) => Ok((isolate, app_id)),
            Err(e) => {
                if let Err(terminate) = self.lifecycle.terminate_isolate(isolate).await {
                    tracing::debug!(%isolate, error = %terminate, "isolate already gone");
                }
                Err(e)
            }
        }
    }

    fn launches(&self) -> MutexGuard<'_, Vec<(IsolateId, AppId, Application)>> {
        self.launched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LifecycleAdapter for IsolateLauncher {
    async fn launch(&self, suite: SuiteId, midlet: &str) {
        let app = Application::new(suite.as_u32(), midlet);
        match self.start(app.clone()).await {
            Ok((isolate, app_id)) => {
                tracing::info!(%app, %isolate, %app_id, "pushed application launched");
                let mut launches = self.launches();
                self.prune(&mut launches);
                launches.push((isolate, app_id, app));
            }
            Err(e) => tracing::warn!(%app, error = %e, "pushed application failed to launch"),
        }
    }
}
