//! Recording application loader for unit tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::app::{AppContext, AppInstance, AppLoader, Application};
use crate::error::{IsolateError, Result};

#[derive(Clone, Default)]
pub(crate) struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub(crate) struct RecordingLoader {
    events: Events,
    fail_start: BTreeSet<String>,
    fail_destroy: BTreeSet<String>,
}

impl RecordingLoader {
    pub(crate) fn new(events: Events) -> Self {
        Self {
            events,
            fail_start: BTreeSet::new(),
            fail_destroy: BTreeSet::new(),
        }
    }

    pub(crate) fn failing_start(mut self, class_name: &str) -> Self {
        self.fail_start.insert(class_name.to_string());
        self
    }

    pub(crate) fn failing_destroy(mut self, class_name: &str) -> Self {
        self.fail_destroy.insert(class_name.to_string());
        self
    }
}

impl AppLoader for RecordingLoader {
    fn load(&self, app: &Application, _context: AppContext) -> Result<Box<dyn AppInstance>> {
        Ok(Box::new(Recording {
            name: app.class_name.clone(),
            events: self.events.clone(),
            fail_start: self.fail_start.contains(&app.class_name),
            fail_destroy: self.fail_destroy.contains(&app.class_name),
        }))
    }
}

struct Recording {
    name: String,
    events: Events,
    fail_start: bool,
    fail_destroy: bool,
}

fn refused(what: &str) -> IsolateError {
    IsolateError::Load {
        class_name: what.to_string(),
        message: "refused".to_string(),
    }
}

#[async_trait]
impl AppInstance for Recording {
    async fn start(&mut self) -> Result<()> {
        self.events.push(format!("start {}", self.name));
        if self.fail_start {
            return Err(refused(&self.name));
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.events.push(format!("pause {}", self.name));
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.events.push(format!("resume {}", self.name));
        Ok(())
    }

    async fn destroy(&mut self, unconditional: bool) -> Result<()> {
        self.events
            .push(format!("destroy {} {}", self.name, unconditional));
        if self.fail_destroy {
            return Err(refused(&self.name));
        }
        Ok(())
    }
}
