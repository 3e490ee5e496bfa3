//! Live push connections.
//!
//! A [`ConnectionRegistry`] pairs every persisted connection record with a
//! reservation held in the native connection layer. When a reservation
//! reports inbound data, the owning application is launched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;

use crate::error::{PushError, Result};
use crate::store::PushStore;
use crate::suite::{ConnectionInfo, LifecycleAdapter, SuiteId};

/// Notified by a reservation when data arrives on its connection.
///
/// The native layer may call this from any thread.
pub trait DataAvailableListener: Send + Sync {
    fn data_available(&self);
}

/// A connection held open by the native layer on behalf of a suite.
pub trait ConnectionReservation: Send + Sync {
    /// Release the connection. Called at most once.
    fn cancel(&self);

    fn has_available_data(&self) -> bool;
}

/// The native connection layer.
pub trait ReservationFactory: Send + Sync {
    fn reserve(
        &self,
        suite: SuiteId,
        info: &ConnectionInfo,
        listener: Arc<dyn DataAvailableListener>,
    ) -> Result<Box<dyn ConnectionReservation>>;
}

struct Launcher {
    suite: SuiteId,
    midlet: String,
    cancelled: Arc<AtomicBool>,
    lifecycle: Arc<dyn LifecycleAdapter>,
    runtime: Handle,
}

impl DataAvailableListener for Launcher {
    fn data_available(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            tracing::debug!(suite = %self.suite, midlet = %self.midlet, "data on cancelled reservation");
            return;
        }
        let lifecycle = Arc::clone(&self.lifecycle);
        let suite = self.suite;
        let midlet = self.midlet.clone();
        tracing::info!(%suite, %midlet, "push data available");
        self.runtime
            .spawn(async move { lifecycle.launch(suite, &midlet).await });
    }
}

struct Entry {
    suite: SuiteId,
    info: ConnectionInfo,
    reservation: Box<dyn ConnectionReservation>,
    cancelled: Arc<AtomicBool>,
}

impl Entry {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.reservation.cancel();
        }
    }
}

/// Registered push connections, live and persisted.
///
/// Launches requested by data-available notifications run on `runtime`.
pub struct ConnectionRegistry {
    store: Arc<PushStore>,
    factory: Arc<dyn ReservationFactory>,
    lifecycle: Arc<dyn LifecycleAdapter>,
    runtime: Handle,
    entries: Mutex<Vec<Entry>>,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<PushStore>,
        factory: Arc<dyn ReservationFactory>,
        lifecycle: Arc<dyn LifecycleAdapter>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            factory,
            lifecycle,
            runtime,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `info` for `suite`.
    ///
    /// A connection registered by another suite is refused with
    /// [`PushError::ConnectionTaken`]. One registered by the same suite is
    /// unregistered first, since the native layer holds a single reservation
    /// per connection; if the new registration then fails, the old one stays
    /// dropped. A refused reservation is an error. Returns `Ok(false)` if a
    /// record could not be written.
    pub fn register_connection(&self, suite: SuiteId, info: ConnectionInfo) -> Result<bool> {
        let mut entries = self.entries();
        if let Some(owner) = entries
            .iter()
            .find(|e| e.info.connection == info.connection && e.suite != suite)
        {
            return Err(PushError::ConnectionTaken {
                connection: info.connection,
                owner: owner.suite,
            });
        }

        if let Some(old) = entries
            .iter()
            .position(|e| e.info.connection == info.connection)
        {
            entries.remove(old).cancel();
            if let Err(e) = self.store.remove_connection(suite, &info.connection) {
                tracing::warn!(%suite, connection = %info.connection, error = %e, "replaced connection record not removed");
                return Ok(false);
            }
        }

        let entry = self.reserve(suite, info.clone())?;
        if let Err(e) = self.store.add_connection(suite, info.clone()) {
            tracing::warn!(%suite, connection = %info.connection, error = %e, "rolling back unpersisted registration");
            entry.cancel();
            return Ok(false);
        }
        entries.push(entry);
        tracing::info!(%suite, connection = %info.connection, midlet = %info.midlet, "connection registered");
        Ok(true)
    }

    /// Drop the registration of `connection` by `suite`.
    ///
    /// The live reservation is cancelled before the record is removed.
    /// Returns `false` if `suite` holds no such registration or the record
    /// could not be removed.
    pub fn unregister_connection(&self, suite: SuiteId, connection: &str) -> bool {
        let mut entries = self.entries();
        let Some(index) = entries
            .iter()
            .position(|e| e.suite == suite && e.info.connection == connection)
        else {
            return false;
        };
        entries.remove(index).cancel();

        match self.store.remove_connection(suite, connection) {
            Ok(_) => {
                tracing::info!(%suite, connection, "connection unregistered");
                true
            }
            Err(e) => {
                tracing::warn!(%suite, connection, error = %e, "connection record not removed");
                false
            }
        }
    }

    /// Reserve every persisted connection of `suite` that is not live yet.
    /// Returns the number of reservations made.
    pub fn enable_connections(&self, suite: SuiteId) -> usize {
        let mut entries = self.entries();
        let mut enabled = 0;
        for info in self.store.suite_connections(suite) {
            if entries
                .iter()
                .any(|e| e.suite == suite && e.info.connection == info.connection)
            {
                continue;
            }
            match self.reserve(suite, info) {
                Ok(entry) => {
                    entries.push(entry);
                    enabled += 1;
                }
                Err(e) => tracing::warn!(%suite, error = %e, "persisted connection not re-enabled"),
            }
        }
        tracing::debug!(%suite, enabled, "connections enabled");
        enabled
    }

    /// [`ConnectionRegistry::enable_connections`] for every suite with
    /// persisted records.
    pub fn enable_all(&self) -> usize {
        self.store
            .connections()
            .into_keys()
            .map(|suite| self.enable_connections(suite))
            .sum()
    }

    /// The connection strings registered by `suite`, sorted. With
    /// `available_only`, only those with data waiting.
    pub fn list_connections(&self, suite: SuiteId, available_only: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries()
            .iter()
            .filter(|e| e.suite == suite)
            .filter(|e| !available_only || e.reservation.has_available_data())
            .map(|e| e.info.connection.clone())
            .collect();
        names.sort();
        names
    }

    pub fn get_midlet(&self, suite: SuiteId, connection: &str) -> Option<String> {
        self.find(suite, connection).map(|info| info.midlet)
    }

    pub fn get_filter(&self, suite: SuiteId, connection: &str) -> Option<String> {
        self.find(suite, connection).map(|info| info.filter)
    }

    /// Cancel and forget every connection of an uninstalled suite.
    pub fn remove_suite(&self, suite: SuiteId) -> Result<()> {
        let mut entries = self.entries();
        entries.retain(|e| {
            if e.suite == suite {
                e.cancel();
                false
            } else {
                true
            }
        });
        self.store.remove_suite_connections(suite)
    }

    /// Cancel every live reservation. Persisted records are kept.
    pub fn dispose(&self) {
        let entries = std::mem::take(&mut *self.entries());
        for entry in &entries {
            entry.cancel();
        }
        tracing::debug!(cancelled = entries.len(), "connection registry disposed");
    }

    fn find(&self, suite: SuiteId, connection: &str) -> Option<ConnectionInfo> {
        self.entries()
            .iter()
            .find(|e| e.suite == suite && e.info.connection == connection)
            .map(|e| e.info.clone())
    }

    fn reserve(&self, suite: SuiteId, info: ConnectionInfo) -> Result<Entry> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let listener = Arc::new(Launcher {
            suite,
            midlet: info.midlet.clone(),
            cancelled: Arc::clone(&cancelled),
            lifecycle: Arc::clone(&self.lifecycle),
            runtime: self.runtime.clone(),
        });
        let reservation = self.factory.reserve(suite, &info, listener)?;
        Ok(Entry {
            suite,
            info,
            reservation,
            cancelled,
        })
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
