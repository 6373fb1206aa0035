use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;

use crate::error::LocalStoreError;
use crate::model::Dataset;

pub const KEY_INVENTORY: &str = "inventario";
pub const KEY_HISTORY: &str = "historial";
pub const KEY_COUNTERS: &str = "contadores";
pub const KEY_LAST_SYNC: &str = "ultimaSincronizacion";

/// String key-value persistence that survives process restarts.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;

    /// Write several items. Implementations with transactions make this all-or-nothing.
    fn set_items(&self, items: &[(&str, String)]) -> Result<(), LocalStoreError> {
        for (k, v) in items {
            self.set_item(k, v)?;
        }
        Ok(())
    }
}

/// SQLite-backed store. One row per key in `sync_kv`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalStoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LocalStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Take ownership of an existing connection and make sure the schema exists.
    pub fn from_connection(conn: Connection) -> Result<Self, LocalStoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Safe to call multiple times.
    pub fn init_schema(&self) -> Result<(), LocalStoreError> {
        let conn = self.conn.lock().map_err(|_| LocalStoreError::Poisoned)?;
        conn.execute_batch(
            r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS sync_kv (
k TEXT PRIMARY KEY,
v TEXT NOT NULL
);
"#,
        )?;
        Ok(())
    }
}

const UPSERT_KV: &str = "INSERT INTO sync_kv(k,v) VALUES(?1,?2)
ON CONFLICT(k) DO UPDATE SET v=excluded.v";

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let conn = self.conn.lock().map_err(|_| LocalStoreError::Poisoned)?;
        let v: Option<String> = conn
            .query_row("SELECT v FROM sync_kv WHERE k=?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(v)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        let conn = self.conn.lock().map_err(|_| LocalStoreError::Poisoned)?;
        conn.execute(UPSERT_KV, params![key, value])?;
        Ok(())
    }

    fn set_items(&self, items: &[(&str, String)]) -> Result<(), LocalStoreError> {
        let conn = self.conn.lock().map_err(|_| LocalStoreError::Poisoned)?;
        let tx = conn.unchecked_transaction()?;
        for (k, v) in items {
            tx.execute(UPSERT_KV, params![k, v])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let items = self.items.lock().map_err(|_| LocalStoreError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        let mut items = self.items.lock().map_err(|_| LocalStoreError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads and writes the dataset fragments and the last-sync mark. No policy.
pub struct LocalStore<S> {
    store: S,
}

impl<S: KeyValueStore> LocalStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Persist inventory, history and counters as JSON.
    pub fn save_local(&self, dataset: &Dataset) -> Result<(), LocalStoreError> {
        let items = [
            (KEY_INVENTORY, serde_json::to_string(&dataset.inventory)?),
            (KEY_HISTORY, serde_json::to_string(&dataset.history)?),
            (KEY_COUNTERS, serde_json::to_string(&dataset.counters)?),
        ];
        self.store.set_items(&items).inspect_err(|e| {
            tracing::error!(error = %e, "failed to save dataset locally");
        })?;
        tracing::debug!(movements = dataset.history.len(), "dataset saved locally");
        Ok(())
    }

    /// Load a fresh dataset; any missing or unreadable fragment stays at its default.
    pub fn load_local(&self) -> Dataset {
        let mut dataset = Dataset::default();
        self.load_local_into(&mut dataset);
        dataset
    }

    /// Overwrite only the fragments that are present and parse. Never fails.
    pub fn load_local_into(&self, dataset: &mut Dataset) {
        if let Some(inventory) = self.read_fragment(KEY_INVENTORY) {
            dataset.inventory = inventory;
        }
        if let Some(history) = self.read_fragment(KEY_HISTORY) {
            dataset.history = history;
        }
        if let Some(counters) = self.read_fragment(KEY_COUNTERS) {
            dataset.counters = counters;
        }
    }

    fn read_fragment<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(key, error = %e, "failed to read local data");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(key, error = %e, "discarding corrupted local data");
                None
            }
        }
    }

    /// Epoch-millis of the last successful push, if any was recorded and parses.
    pub fn last_sync(&self) -> Option<i64> {
        match self.store.get_item(KEY_LAST_SYNC) {
            Ok(Some(raw)) => raw.trim().parse::<i64>().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "failed to read last sync time");
                None
            }
        }
    }

    pub fn record_sync(&self, now_ms: i64) -> Result<(), LocalStoreError> {
        self.store.set_item(KEY_LAST_SYNC, &now_ms.to_string())
    }
}
