//! Push registrations against the on-disk content store, across restarts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use jump_content_store::{FileContentStore, StoreHandle};
use jump_push_registry::{
    AlarmRegistry, ConnectionInfo, ConnectionRegistry, ConnectionReservation,
    DataAvailableListener, LifecycleAdapter, PushStore, ReservationFactory, Result, SuiteId,
};
use tokio::sync::mpsc;

struct Reservation(AtomicBool);

impl ConnectionReservation for Reservation {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn has_available_data(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Reservations(Mutex<Vec<String>>);

impl Reservations {
    fn made(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl ReservationFactory for Reservations {
    fn reserve(
        &self,
        _suite: SuiteId,
        info: &ConnectionInfo,
        _listener: Arc<dyn DataAvailableListener>,
    ) -> Result<Box<dyn ConnectionReservation>> {
        self.0.lock().unwrap().push(info.connection.clone());
        Ok(Box::new(Reservation(AtomicBool::new(false))))
    }
}

struct Launcher(mpsc::UnboundedSender<(SuiteId, String)>);

#[async_trait]
impl LifecycleAdapter for Launcher {
    async fn launch(&self, suite: SuiteId, midlet: &str) {
        let _ = self.0.send((suite, midlet.to_string()));
    }
}

fn push_store(root: &Path) -> Arc<PushStore> {
    let store = Arc::new(FileContentStore::open(root).unwrap());
    Arc::new(PushStore::open(StoreHandle::new(store, true)).unwrap())
}

fn connections(root: &Path) -> (ConnectionRegistry, Arc<Reservations>) {
    let reservations = Arc::new(Reservations::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let registry = ConnectionRegistry::new(
        push_store(root),
        reservations.clone(),
        Arc::new(Launcher(tx)),
        tokio::runtime::Handle::current(),
    );
    (registry, reservations)
}

#[tokio::test]
async fn unregistered_connection_is_not_reenabled() {
    let dir = tempfile::tempdir().unwrap();
    let suite = SuiteId::new(42);
    {
        let (registry, _) = connections(dir.path());
        let info = ConnectionInfo::new("socket://:79", "com.example.Finger", "*");
        assert!(registry.register_connection(suite, info).unwrap());
        assert!(registry.unregister_connection(suite, "socket://:79"));
    }

    let (registry, reservations) = connections(dir.path());
    assert_eq!(registry.enable_connections(suite), 0);
    assert!(reservations.made().is_empty());
    assert!(!dir.path().join("PushRegistry/connections/2a").exists());
}

#[tokio::test]
async fn registrations_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let suite = SuiteId::new(42);
    {
        let (registry, _) = connections(dir.path());
        registry
            .register_connection(suite, ConnectionInfo::new("socket://:79", "A", "*"))
            .unwrap();
        registry
            .register_connection(suite, ConnectionInfo::new("sms://:5000", "B", "+1555*"))
            .unwrap();
        registry
            .register_connection(SuiteId::new(7), ConnectionInfo::new("socket://:80", "C", "*"))
            .unwrap();
    }

    let on_disk =
        std::fs::read_to_string(dir.path().join("PushRegistry/connections/2a")).unwrap();
    assert_eq!(on_disk, "socket://:79\nA\n*\nsms://:5000\nB\n+1555*\n");

    let (registry, reservations) = connections(dir.path());
    assert_eq!(registry.enable_all(), 3);
    assert_eq!(reservations.made().len(), 3);
    assert_eq!(
        registry.list_connections(suite, false),
        vec!["sms://:5000", "socket://:79"]
    );
    assert_eq!(registry.get_filter(suite, "sms://:5000").as_deref(), Some("+1555*"));
    assert_eq!(registry.enable_all(), 0);
}

#[tokio::test(start_paused = true)]
async fn alarms_fire_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let suite = SuiteId::new(3);
    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let alarms = AlarmRegistry::new(push_store(dir.path()), Arc::new(Launcher(tx.clone())));
        alarms
            .register_alarm(suite, "com.example.Clock", Utc::now() + TimeDelta::minutes(5))
            .unwrap();
        alarms.dispose();
    }
    assert!(rx.try_recv().is_err());

    let store = push_store(dir.path());
    let alarms = AlarmRegistry::new(Arc::clone(&store), Arc::new(Launcher(tx)));
    assert_eq!(alarms.read_alarms().unwrap(), 1);

    let (fired_suite, midlet) = rx.recv().await.unwrap();
    assert_eq!(fired_suite, suite);
    assert_eq!(midlet, "com.example.Clock");
    assert!(store.alarms().is_empty());
    assert!(!dir.path().join("PushRegistry/alarms/3").exists());
}
