//! # JUMP Push Registry
//!
//! Applications ask to be launched when data arrives on a connection or when
//! an alarm goes off. The [`ConnectionRegistry`] keeps a reservation in the
//! native connection layer for every registered connection; the
//! [`AlarmRegistry`] keeps a timer for every alarm. Both persist their
//! records through a [`PushStore`] on the content store, so registrations
//! survive a restart.

mod alarms;
mod connections;
mod error;
mod module;
mod store;
mod suite;
#[cfg(test)]
mod testing;

pub use alarms::AlarmRegistry;
pub use connections::{
    ConnectionRegistry, ConnectionReservation, DataAvailableListener, ReservationFactory,
};
pub use error::{PushError, Result};
pub use module::{push_registry_factory, PushRegistryModule, RESTORE_PROPERTY};
pub use store::{AlarmTable, PushStore, ROOT};
pub use suite::{ConnectionInfo, LifecycleAdapter, SuiteId};
