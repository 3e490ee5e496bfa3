//! Test doubles for the connection layer and the application launcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::connections::{ConnectionReservation, DataAvailableListener, ReservationFactory};
use crate::error::{PushError, Result};
use crate::suite::{ConnectionInfo, LifecycleAdapter, SuiteId};

pub struct MockState {
    cancelled: AtomicBool,
    available: AtomicBool,
    listener: Arc<dyn DataAvailableListener>,
}

impl MockState {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Simulate inbound data.
    pub fn ping(&self) {
        self.listener.data_available();
    }
}

struct MockReservation(Arc<MockState>);

impl ConnectionReservation for MockReservation {
    fn cancel(&self) {
        let already = self.0.cancelled.swap(true, Ordering::AcqRel);
        assert!(!already, "double cancellation");
    }

    fn has_available_data(&self) -> bool {
        assert!(!self.0.is_cancelled(), "cancelled reservation");
        self.0.available.load(Ordering::Acquire)
    }
}

/// Holds at most one live reservation per connection.
#[derive(Default)]
pub struct MockFactory {
    latest: Mutex<HashMap<String, Arc<MockState>>>,
    refused: Mutex<HashSet<String>>,
    count: AtomicUsize,
}

impl MockFactory {
    pub fn refuse(&self, connection: &str) {
        self.refused.lock().unwrap().insert(connection.to_string());
    }

    /// The most recent reservation of `connection`.
    pub fn reservation(&self, connection: &str) -> Option<Arc<MockState>> {
        self.latest.lock().unwrap().get(connection).cloned()
    }

    /// Number of reservations made.
    pub fn reservations(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl ReservationFactory for MockFactory {
    fn reserve(
        &self,
        _suite: SuiteId,
        info: &ConnectionInfo,
        listener: Arc<dyn DataAvailableListener>,
    ) -> Result<Box<dyn ConnectionReservation>> {
        if self.refused.lock().unwrap().contains(&info.connection) {
            return Err(PushError::reservation(&info.connection, "refused"));
        }
        if self
            .reservation(&info.connection)
            .is_some_and(|held| !held.is_cancelled())
        {
            return Err(PushError::reservation(&info.connection, "already reserved"));
        }
        let state = Arc::new(MockState {
            cancelled: AtomicBool::new(false),
            available: AtomicBool::new(false),
            listener,
        });
        self.latest
            .lock()
            .unwrap()
            .insert(info.connection.clone(), Arc::clone(&state));
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockReservation(state)))
    }
}

/// Records launch requests in order.
#[derive(Clone, Default)]
pub struct Launches {
    pending: Arc<Mutex<VecDeque<(SuiteId, String)>>>,
    notify: Arc<Notify>,
}

impl Launches {
    /// Wait for the next launch.
    pub async fn next(&self) -> (SuiteId, String) {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                if let Some(launch) = self.pending.lock().unwrap().pop_front() {
                    return launch;
                }
                self.notify.notified().await;
            }
        })
        .await
        .expect("no launch")
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl LifecycleAdapter for Launches {
    async fn launch(&self, suite: SuiteId, midlet: &str) {
        self.pending
            .lock()
            .unwrap()
            .push_back((suite, midlet.to_string()));
        self.notify.notify_one();
    }
}
