//! Built-in applications for the command line.

use std::sync::Arc;

use async_trait::async_trait;
use jump_isolate::{AppContext, AppInstance, AppLoader, Application, Result};
use jump_module::{AppHandle, PresentationModule};

/// Loads every application as a [`DemoApp`].
pub struct DemoLoader {
    presentation: Option<Arc<PresentationModule>>,
}

impl DemoLoader {
    pub fn new() -> Self {
        Self { presentation: None }
    }

    /// Demo applications open one window in `presentation` while they run.
    pub fn with_presentation(presentation: Arc<PresentationModule>) -> Self {
        Self {
            presentation: Some(presentation),
        }
    }
}

impl Default for DemoLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AppLoader for DemoLoader {
    fn load(&self, app: &Application, context: AppContext) -> Result<Box<dyn AppInstance>> {
        tracing::debug!(%app, isolate = %context.isolate, args = ?context.args(), "demo app loaded");
        Ok(Box::new(DemoApp {
            app: app.clone(),
            handle: AppHandle {
                isolate: context.isolate,
                app_id: context.app_id.as_u32(),
            },
            presentation: self.presentation.clone(),
        }))
    }
}

/// An application that logs its transitions.
pub struct DemoApp {
    app: Application,
    handle: AppHandle,
    presentation: Option<Arc<PresentationModule>>,
}

#[async_trait]
impl AppInstance for DemoApp {
    async fn start(&mut self) -> Result<()> {
        if let Some(presentation) = &self.presentation {
            let window = presentation.presentation().open_window(self.handle);
            presentation.presentation().focus(window);
        }
        tracing::info!(app = %self.app, "demo app started");
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        tracing::info!(app = %self.app, "demo app paused");
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        tracing::info!(app = %self.app, "demo app resumed");
        Ok(())
    }

    async fn destroy(&mut self, unconditional: bool) -> Result<()> {
        if let Some(presentation) = &self.presentation {
            presentation.presentation().close_windows(self.handle);
        }
        tracing::info!(app = %self.app, unconditional, "demo app destroyed");
        Ok(())
    }
}
