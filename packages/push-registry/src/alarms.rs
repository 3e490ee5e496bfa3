//! Alarm-based launches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::error::{PushError, Result};
use crate::store::PushStore;
use crate::suite::{LifecycleAdapter, SuiteId};

type AlarmKey = (SuiteId, String);

struct Scheduled {
    time: DateTime<Utc>,
    id: u64,
    task: JoinHandle<()>,
}

struct Inner {
    store: Arc<PushStore>,
    lifecycle: Arc<dyn LifecycleAdapter>,
    alarms: Mutex<HashMap<AlarmKey, Scheduled>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl Inner {
    fn alarms(&self) -> MutexGuard<'_, HashMap<AlarmKey, Scheduled>> {
        self.alarms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_record(&self, suite: SuiteId, midlet: &str) {
        if let Err(e) = self.store.remove_alarm(suite, midlet) {
            tracing::warn!(%suite, midlet, error = %e, "alarm record not removed");
        }
    }
}

/// Launches applications at registered wall-clock times.
///
/// Each application of a suite has at most one alarm. Alarms are persisted
/// so [`AlarmRegistry::read_alarms`] can reschedule them after a restart; an
/// alarm whose time has already passed fires immediately. A fired alarm's
/// record is removed.
///
/// Scheduling spawns Tokio tasks, so registering and reading alarms must
/// happen within a Tokio runtime.
pub struct AlarmRegistry {
    inner: Arc<Inner>,
}

impl AlarmRegistry {
    pub fn new(store: Arc<PushStore>, lifecycle: Arc<dyn LifecycleAdapter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                lifecycle,
                alarms: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Schedule every persisted alarm. Returns the number scheduled.
    pub fn read_alarms(&self) -> Result<usize> {
        self.check_live()?;
        let mut alarms = self.inner.alarms();
        let mut count = 0;
        for (suite, table) in self.inner.store.alarms() {
            for (midlet, millis) in table {
                let Some(time) = DateTime::from_timestamp_millis(millis) else {
                    tracing::warn!(%suite, %midlet, millis, "skipping alarm with unrepresentable time");
                    continue;
                };
                let key = (suite, midlet);
                if let Some(old) = alarms.remove(&key) {
                    old.task.abort();
                }
                let scheduled = self.schedule(key.clone(), time);
                alarms.insert(key, scheduled);
                count += 1;
            }
        }
        tracing::debug!(count, "persisted alarms scheduled");
        Ok(count)
    }

    /// Schedule a launch of `midlet` at `time`, replacing any alarm it
    /// already had. Returns the replaced alarm's time.
    ///
    /// If the alarm cannot be persisted the error is returned and no alarm
    /// remains scheduled for `midlet`.
    pub fn register_alarm(
        &self,
        suite: SuiteId,
        midlet: &str,
        time: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.check_live()?;
        let key = (suite, midlet.to_string());
        let mut alarms = self.inner.alarms();
        let previous = alarms.remove(&key).map(|old| {
            old.task.abort();
            old.time
        });

        self.inner
            .store
            .add_alarm(suite, midlet, time.timestamp_millis())?;
        let scheduled = self.schedule(key.clone(), time);
        alarms.insert(key, scheduled);
        tracing::info!(%suite, midlet, %time, "alarm registered");
        Ok(previous)
    }

    /// The time `midlet`'s alarm is scheduled for.
    pub fn scheduled(&self, suite: SuiteId, midlet: &str) -> Option<DateTime<Utc>> {
        self.inner
            .alarms()
            .get(&(suite, midlet.to_string()))
            .map(|s| s.time)
    }

    /// Number of alarms waiting to fire.
    pub fn pending(&self) -> usize {
        self.inner.alarms().len()
    }

    /// Cancel and forget every alarm of an uninstalled suite.
    pub fn remove_suite_alarms(&self, suite: SuiteId) -> Result<()> {
        let mut alarms = self.inner.alarms();
        alarms.retain(|(owner, _), scheduled| {
            if *owner == suite {
                scheduled.task.abort();
                false
            } else {
                true
            }
        });
        self.inner.store.remove_suite_alarms(suite)?;
        Ok(())
    }

    /// Cancel every scheduled alarm. Records are kept; later registrations
    /// fail with [`PushError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let alarms = std::mem::take(&mut *self.inner.alarms());
        for scheduled in alarms.values() {
            scheduled.task.abort();
        }
        tracing::debug!(cancelled = alarms.len(), "alarm registry disposed");
    }

    fn check_live(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(PushError::Disposed);
        }
        Ok(())
    }

    fn schedule(&self, key: AlarmKey, time: DateTime<Utc>) -> Scheduled {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = (time - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(inner, key, id).await;
        });
        Scheduled { time, id, task }
    }
}

async fn fire(inner: Arc<Inner>, key: AlarmKey, id: u64) {
    {
        let mut alarms = inner.alarms();
        match alarms.get(&key) {
            Some(scheduled) if scheduled.id == id => {
                alarms.remove(&key);
            }
            _ => return,
        }
        inner.forget_record(key.0, &key.1);
    }
    let (suite, midlet) = key;
    tracing::info!(%suite, %midlet, "alarm fired");
    inner.lifecycle.launch(suite, &midlet).await;
}

impl Drop for AlarmRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
