//! Persistent push records.
//!
//! Records live in the content store under `./PushRegistry`:
//!
//! ```text
//! ./PushRegistry/connections/<suite>   connection\nmidlet\nfilter\n ...
//! ./PushRegistry/alarms/<suite>        midlet:epochMillis\n ...
//! ```
//!
//! `<suite>` is the suite id in lowercase hex. A suite without records has
//! no node. [`PushStore`] keeps a copy of both tables in memory and writes
//! a suite's node through on every change; the copy is only updated once
//! the write succeeded.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use jump_content_store::{StoreHandle, StoreUri};

use crate::error::{PushError, Result};
use crate::suite::{ConnectionInfo, SuiteId};

pub const ROOT: &str = "./PushRegistry";

/// Scheduled alarms of one suite: application class name to epoch millis.
pub type AlarmTable = BTreeMap<String, i64>;

/// Encoding of one suite's records as a data node.
trait Records: Default + Clone {
    fn decode(uri: &StoreUri, data: &[u8]) -> Result<Self>;
    fn encode(&self) -> Bytes;
    fn is_empty(&self) -> bool;
}

impl Records for Vec<ConnectionInfo> {
    fn decode(uri: &StoreUri, data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|e| PushError::corrupt(uri, e.to_string()))?;
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() % 3 != 0 {
            return Err(PushError::corrupt(
                uri,
                format!("{} lines is not a whole number of records", lines.len()),
            ));
        }
        Ok(lines
            .chunks(3)
            .map(|r| ConnectionInfo::new(r[0], r[1], r[2]))
            .collect())
    }

    fn encode(&self) -> Bytes {
        let mut out = String::new();
        for info in self {
            for field in [&info.connection, &info.midlet, &info.filter] {
                out.push_str(field);
                out.push('\n');
            }
        }
        Bytes::from(out)
    }

    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl Records for AlarmTable {
    fn decode(uri: &StoreUri, data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|e| PushError::corrupt(uri, e.to_string()))?;
        text.lines()
            .map(|line| {
                let (midlet, millis) = line
                    .rsplit_once(':')
                    .ok_or_else(|| PushError::corrupt(uri, format!("no time in {line:?}")))?;
                let millis = millis
                    .parse::<i64>()
                    .map_err(|e| PushError::corrupt(uri, format!("bad time in {line:?}: {e}")))?;
                Ok((midlet.to_string(), millis))
            })
            .collect()
    }

    fn encode(&self) -> Bytes {
        let mut out = String::new();
        for (midlet, millis) in self {
            out.push_str(&format!("{midlet}:{millis}\n"));
        }
        Bytes::from(out)
    }

    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

#[derive(Default)]
struct Tables {
    connections: BTreeMap<SuiteId, Vec<ConnectionInfo>>,
    alarms: BTreeMap<SuiteId, AlarmTable>,
}

/// Persistent connection and alarm tables.
pub struct PushStore {
    handle: StoreHandle,
    connections_root: StoreUri,
    alarms_root: StoreUri,
    tables: Mutex<Tables>,
}

impl PushStore {
    /// Open the push tables on an exclusive store handle, creating the
    /// layout if needed and reading any existing records.
    pub fn open(handle: StoreHandle) -> Result<Self> {
        let root = StoreUri::parse(ROOT)?;
        let store = Self {
            connections_root: root.child("connections")?,
            alarms_root: root.child("alarms")?,
            handle,
            tables: Mutex::new(Tables::default()),
        };
        store.handle.create_nodes(&store.connections_root)?;
        store.handle.create_nodes(&store.alarms_root)?;
        store.read_data()?;
        Ok(store)
    }

    /// Reload both tables from the store. Nodes left without records are
    /// deleted.
    pub fn read_data(&self) -> Result<()> {
        let connections = self.read_table(&self.connections_root)?;
        let alarms = self.read_table(&self.alarms_root)?;
        tracing::debug!(
            connection_suites = connections.len(),
            alarm_suites = alarms.len(),
            "push records read"
        );
        *self.tables() = Tables {
            connections,
            alarms,
        };
        Ok(())
    }

    /// Snapshot of every suite's connections.
    pub fn connections(&self) -> BTreeMap<SuiteId, Vec<ConnectionInfo>> {
        self.tables().connections.clone()
    }

    pub fn suite_connections(&self, suite: SuiteId) -> Vec<ConnectionInfo> {
        self.tables()
            .connections
            .get(&suite)
            .cloned()
            .unwrap_or_default()
    }

    /// Persist `info` for `suite`, replacing any record for the same
    /// connection string.
    pub fn add_connection(&self, suite: SuiteId, info: ConnectionInfo) -> Result<()> {
        let mut tables = self.tables();
        let mut records = tables.connections.get(&suite).cloned().unwrap_or_default();
        match records.iter_mut().find(|r| r.connection == info.connection) {
            Some(existing) => *existing = info,
            None => records.push(info),
        }
        self.write(&self.connections_root, suite, &records)?;
        tables.connections.insert(suite, records);
        Ok(())
    }

    /// Remove the record for `connection`. Returns `false` if `suite` had
    /// none.
    pub fn remove_connection(&self, suite: SuiteId, connection: &str) -> Result<bool> {
        let mut tables = self.tables();
        let Some(current) = tables.connections.get(&suite) else {
            return Ok(false);
        };
        let records: Vec<_> = current
            .iter()
            .filter(|r| r.connection != connection)
            .cloned()
            .collect();
        if records.len() == current.len() {
            return Ok(false);
        }
        self.write(&self.connections_root, suite, &records)?;
        set_or_remove(&mut tables.connections, suite, records);
        Ok(true)
    }

    pub fn remove_suite_connections(&self, suite: SuiteId) -> Result<()> {
        let mut tables = self.tables();
        self.write(&self.connections_root, suite, &Vec::<ConnectionInfo>::new())?;
        tables.connections.remove(&suite);
        Ok(())
    }

    /// Snapshot of every suite's alarms.
    pub fn alarms(&self) -> BTreeMap<SuiteId, AlarmTable> {
        self.tables().alarms.clone()
    }

    /// Persist an alarm, replacing any earlier one for the same application.
    pub fn add_alarm(&self, suite: SuiteId, midlet: &str, millis: i64) -> Result<()> {
        let mut tables = self.tables();
        let mut records = tables.alarms.get(&suite).cloned().unwrap_or_default();
        records.insert(midlet.to_string(), millis);
        self.write(&self.alarms_root, suite, &records)?;
        tables.alarms.insert(suite, records);
        Ok(())
    }

    pub fn remove_alarm(&self, suite: SuiteId, midlet: &str) -> Result<bool> {
        let mut tables = self.tables();
        let Some(current) = tables.alarms.get(&suite) else {
            return Ok(false);
        };
        if !current.contains_key(midlet) {
            return Ok(false);
        }
        let mut records = current.clone();
        records.remove(midlet);
        self.write(&self.alarms_root, suite, &records)?;
        set_or_remove(&mut tables.alarms, suite, records);
        Ok(true)
    }

    pub fn remove_suite_alarms(&self, suite: SuiteId) -> Result<()> {
        let mut tables = self.tables();
        self.write(&self.alarms_root, suite, &AlarmTable::new())?;
        tables.alarms.remove(&suite);
        Ok(())
    }

    /// Close the underlying handle. Later writes fail.
    pub fn close(&self) {
        self.handle.close();
    }

    fn read_table<T: Records>(&self, root: &StoreUri) -> Result<BTreeMap<SuiteId, T>> {
        let mut table = BTreeMap::new();
        let Some(node) = self.handle.get_node(root)? else {
            return Ok(table);
        };
        for name in node.children() {
            let Some(suite) = SuiteId::from_node_name(name) else {
                tracing::warn!(%root, name, "ignoring push node with a non-suite name");
                continue;
            };
            let uri = root.child(name)?;
            let Some(data) = self.handle.get_data(&uri)? else {
                tracing::warn!(%uri, "ignoring push node that holds no data");
                continue;
            };
            let records = T::decode(&uri, &data)?;
            if records.is_empty() {
                self.handle.delete_node(&uri)?;
                tracing::debug!(%uri, "removed empty push node");
                continue;
            }
            table.insert(suite, records);
        }
        Ok(table)
    }

    fn write<T: Records>(&self, root: &StoreUri, suite: SuiteId, records: &T) -> Result<()> {
        let uri = root.child(&suite.node_name())?;
        if records.is_empty() {
            self.handle.delete_node(&uri)?;
        } else if self.handle.get_node(&uri)?.is_some() {
            self.handle.update_data_node(&uri, records.encode())?;
        } else {
            self.handle.create_data_node(&uri, records.encode())?;
        }
        Ok(())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_or_remove<T: Records>(table: &mut BTreeMap<SuiteId, T>, suite: SuiteId, records: T) {
    if records.is_empty() {
        table.remove(&suite);
    } else {
        table.insert(suite, records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jump_content_store::{ContentStore, InMemoryContentStore};
    use std::sync::Arc;

    fn memory() -> Arc<dyn ContentStore> {
        Arc::new(InMemoryContentStore::new())
    }

    fn open(store: &Arc<dyn ContentStore>) -> PushStore {
        PushStore::open(StoreHandle::new(Arc::clone(store), true)).unwrap()
    }

    fn uri(s: &str) -> StoreUri {
        StoreUri::parse(s).unwrap()
    }

    #[test]
    fn connection_records_are_newline_triples() {
        let store = memory();
        let push = open(&store);
        push.add_connection(
            SuiteId::new(42),
            ConnectionInfo::new("socket://:79", "com.example.Finger", "*"),
        )
        .unwrap();

        let data = store
            .get_node(&uri("./PushRegistry/connections/2a"))
            .unwrap()
            .and_then(|n| n.into_data())
            .unwrap();
        assert_eq!(data.as_ref(), b"socket://:79\ncom.example.Finger\n*\n");
    }

    #[test]
    fn alarm_records_are_midlet_and_millis() {
        let store = memory();
        let push = open(&store);
        push.add_alarm(SuiteId::new(255), "com.example.Clock", 1_000)
            .unwrap();

        let data = store
            .get_node(&uri("./PushRegistry/alarms/ff"))
            .unwrap()
            .and_then(|n| n.into_data())
            .unwrap();
        assert_eq!(data.as_ref(), b"com.example.Clock:1000\n");
    }

    #[test]
    fn same_connection_replaces_the_record() {
        let push = open(&memory());
        let suite = SuiteId::new(1);
        push.add_connection(suite, ConnectionInfo::new("sms://:5000", "A", "*"))
            .unwrap();
        push.add_connection(suite, ConnectionInfo::new("sms://:5000", "B", "+1*"))
            .unwrap();
        assert_eq!(
            push.suite_connections(suite),
            vec![ConnectionInfo::new("sms://:5000", "B", "+1*")]
        );
    }

    #[test]
    fn removing_the_last_record_deletes_the_node() {
        let store = memory();
        let push = open(&store);
        let suite = SuiteId::new(7);
        push.add_connection(suite, ConnectionInfo::new("socket://:79", "A", "*"))
            .unwrap();
        assert!(push.remove_connection(suite, "socket://:79").unwrap());
        assert!(!push.remove_connection(suite, "socket://:79").unwrap());

        assert_eq!(store.get_node(&uri("./PushRegistry/connections/7")).unwrap(), None);
        assert!(push.connections().is_empty());
    }

    #[test]
    fn tables_survive_reopen() {
        let store = memory();
        {
            let push = open(&store);
            push.add_connection(SuiteId::new(1), ConnectionInfo::new("a", "A", "*"))
                .unwrap();
            push.add_connection(SuiteId::new(2), ConnectionInfo::new("b", "B", "*"))
                .unwrap();
            push.add_alarm(SuiteId::new(2), "B", 5).unwrap();
        }

        let push = open(&store);
        assert_eq!(push.connections().len(), 2);
        assert_eq!(push.alarms()[&SuiteId::new(2)]["B"], 5);
    }

    #[test]
    fn empty_nodes_are_removed_on_read() {
        let store = memory();
        open(&store);
        store
            .create_data_node(&uri("./PushRegistry/alarms/3"), Bytes::new())
            .unwrap();

        let push = open(&store);
        assert!(push.alarms().is_empty());
        assert_eq!(store.get_node(&uri("./PushRegistry/alarms/3")).unwrap(), None);
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let store = memory();
        open(&store);
        store
            .create_data_node(
                &uri("./PushRegistry/connections/3"),
                Bytes::from_static(b"socket://:79\nA\n"),
            )
            .unwrap();

        let err = PushStore::open(StoreHandle::new(store, true)).err().unwrap();
        assert!(matches!(err, PushError::Corrupt { .. }));
    }

    #[test]
    fn failed_write_leaves_the_table_alone() {
        let push = open(&memory());
        push.add_alarm(SuiteId::new(1), "A", 1).unwrap();
        push.close();

        assert!(push.add_alarm(SuiteId::new(1), "B", 2).is_err());
        assert_eq!(push.alarms()[&SuiteId::new(1)].len(), 1);
    }
}
