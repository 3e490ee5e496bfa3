//! An in-process stand-in for the native connection layer.
//!
//! Nothing listens on a real socket. Inbound data is simulated with
//! [`SimulatedConnections::deliver`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jump_push_registry::{
    ConnectionInfo, ConnectionReservation, DataAvailableListener, PushError, ReservationFactory,
    SuiteId,
};

struct Slot {
    suite: SuiteId,
    listener: Arc<dyn DataAvailableListener>,
    flags: Arc<Flags>,
}

#[derive(Default)]
struct Flags {
    available: AtomicBool,
    cancelled: AtomicBool,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection reservations kept in memory.
///
/// A connection string can be held by one reservation at a time. It must be
/// cancelled before the connection can be reserved again, even by the same
/// suite.
#[derive(Default)]
pub struct SimulatedConnections {
    slots: Slots,
}

impl SimulatedConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark data as waiting on `connection` and notify its holder. Returns
    /// `false` if nobody holds it.
    pub fn deliver(&self, connection: &str) -> bool {
        let listener = {
            let slots = lock(&self.slots);
            let Some(slot) = slots.get(connection) else {
                return false;
            };
            slot.flags.available.store(true, Ordering::Release);
            Arc::clone(&slot.listener)
        };
        tracing::debug!(connection, "simulated data delivered");
        listener.data_available();
        true
    }

    /// The connection strings currently held, sorted.
    pub fn reserved(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.slots).keys().cloned().collect();
        names.sort();
        names
    }
}

impl ReservationFactory for SimulatedConnections {
    fn reserve(
        &self,
        suite: SuiteId,
        info: &ConnectionInfo,
        listener: Arc<dyn DataAvailableListener>,
    ) -> jump_push_registry::Result<Box<dyn ConnectionReservation>> {
        let mut slots = lock(&self.slots);
        if let Some(holder) = slots.get(&info.connection) {
            return Err(PushError::reservation(
                &info.connection,
                format!("held by suite {}", holder.suite),
            ));
        }
        let flags = Arc::new(Flags::default());
        slots.insert(
            info.connection.clone(),
            Slot {
                suite,
                listener,
                flags: Arc::clone(&flags),
            },
        );
        Ok(Box::new(SimulatedReservation {
            connection: info.connection.clone(),
            slots: Arc::clone(&self.slots),
            flags,
        }))
    }
}

struct SimulatedReservation {
    connection: String,
    slots: Slots,
    flags: Arc<Flags>,
}

impl ConnectionReservation for SimulatedReservation {
    fn cancel(&self) {
        if self.flags.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slots = lock(&self.slots);
        if slots
            .get(&self.connection)
            .is_some_and(|slot| Arc::ptr_eq(&slot.flags, &self.flags))
        {
            slots.remove(&self.connection);
        }
    }

    fn has_available_data(&self) -> bool {
        self.flags.available.load(Ordering::Acquire)
    }
}
