//! Key/subkey storage.
//!
//! Plugins and the dispatcher persist small values through the [`Store`]
//! trait: cooldown timestamps, coin balances, inventories. Values are
//! addressed by a primary `key` (usually a user or room) and a `subkey`
//! (the feature owning the value). Writes are last-write-wins; only
//! [`Store::update`] and the helpers built on it are atomic per entry, and
//! [`Store::transact`] changes several entries as one unit.
//!
//! Two implementations ship with the core:
//!
//! | Engine | Type | Persistence |
//! |--------|------|-------------|
//! | `memory` | [`MemoryStore`] | none |
//! | `json` | [`FileStore`] | a single JSON document, rewritten on every change |
//!
//! Typed access goes through [`StoreExt`]:
//!
//! ```rust,ignore
//! let balance: i64 = store.get_json("alice", "coins").await?.unwrap_or(0);
//! store.set_json("alice", "inventory", &vec!["sword"]).await?;
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Transformation applied by [`Store::update`].
///
/// Receives the current value (if any) and returns the new one; `None`
/// removes the entry.
pub type UpdateFn<'a> = dyn Fn(Option<&str>) -> StoreResult<Option<String>> + Send + Sync + 'a;

/// Transformation applied by [`Store::transact`].
///
/// Receives the current values in the order the entries were named and
/// rewrites them in place; `None` removes an entry. Returning an error
/// aborts the transaction with nothing written.
pub type TransactFn<'a> = dyn Fn(&mut [Option<String>]) -> StoreResult<()> + Send + Sync + 'a;

// ─── Store trait ──────────────────────────────────────────────────────────────

/// Key/subkey value storage shared by the runtime and plugins.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short engine name used in logs.
    fn engine(&self) -> &'static str;

    /// Reads a value.
    async fn get_value(&self, key: &str, subkey: &str) -> StoreResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn set_value(&self, key: &str, subkey: &str, value: &str) -> StoreResult<()>;

    /// Removes a value. Removing a missing value is not an error.
    async fn remove_value(&self, key: &str, subkey: &str) -> StoreResult<()>;

    /// Atomically replaces a value with the result of `f`.
    ///
    /// Returns the value now stored.
    async fn update(
        &self,
        key: &str,
        subkey: &str,
        f: &UpdateFn<'_>,
    ) -> StoreResult<Option<String>>;

    /// Atomically rewrites several `(key, subkey)` entries with `f`.
    ///
    /// Either every change is stored or none is. Returns the values now
    /// stored, in the order of `entries`.
    async fn transact(
        &self,
        entries: &[(&str, &str)],
        f: &TransactFn<'_>,
    ) -> StoreResult<Vec<Option<String>>>;

    /// All `(key, value)` pairs stored under `subkey`.
    async fn subkey_entries(&self, subkey: &str) -> StoreResult<Vec<(String, String)>>;

    /// The newest `limit` history entries for `key`/`subkey`, newest first.
    async fn history(&self, key: &str, subkey: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Pushes a history entry, keeping at most `max_len` entries.
    async fn prepend_value(
        &self,
        key: &str,
        subkey: &str,
        value: &str,
        max_len: usize,
    ) -> StoreResult<()>;

    /// Atomically adds `delta` to an integer value (missing counts as zero).
    async fn increment(&self, key: &str, subkey: &str, delta: i64) -> StoreResult<i64> {
        let add = |current: Option<&str>| -> StoreResult<Option<String>> {
            let current = match current {
                None => 0,
                Some(raw) => raw.trim().parse::<i64>().map_err(|_| StoreError::NotAnInteger {
                    key: key.to_string(),
                    subkey: subkey.to_string(),
                    value: raw.to_string(),
                })?,
            };
            Ok(Some(current.saturating_add(delta).to_string()))
        };
        let stored = self.update(key, subkey, &add).await?;
        Ok(stored.and_then(|v| v.parse().ok()).unwrap_or_default())
    }
}

/// JSON helpers available on every [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    /// Reads and deserializes a JSON value.
    async fn get_json<T>(&self, key: &str, subkey: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_value(key, subkey).await? {
            None => Ok(None),
            Some(raw) => from_json(key, subkey, &raw).map(Some),
        }
    }

    /// Serializes and writes a JSON value.
    async fn set_json<T>(&self, key: &str, subkey: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let raw = to_json(key, subkey, value)?;
        self.set_value(key, subkey, &raw).await
    }

    /// Atomically transforms a JSON value.
    async fn update_json<T, F>(&self, key: &str, subkey: &str, f: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Fn(Option<T>) -> T + Send + Sync,
    {
        let apply = |current: Option<&str>| -> StoreResult<Option<String>> {
            let current = current.map(|raw| from_json(key, subkey, raw)).transpose()?;
            to_json(key, subkey, &f(current)).map(Some)
        };
        let stored = self.update(key, subkey, &apply).await?;
        let raw = stored.ok_or_else(|| StoreError::Serialization {
            key: key.to_string(),
            subkey: subkey.to_string(),
            message: "value vanished during update".into(),
        })?;
        from_json(key, subkey, &raw)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn from_json<T: DeserializeOwned>(key: &str, subkey: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
        key: key.to_string(),
        subkey: subkey.to_string(),
        message: e.to_string(),
    })
}

fn to_json<T: Serialize + ?Sized>(key: &str, subkey: &str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization {
        key: key.to_string(),
        subkey: subkey.to_string(),
        message: e.to_string(),
    })
}

// ─── Shared tables ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Tables {
    values: BTreeMap<String, BTreeMap<String, String>>,
    history: BTreeMap<String, BTreeMap<String, VecDeque<String>>>,
}

impl Tables {
    fn get(&self, key: &str, subkey: &str) -> Option<String> {
        self.values.get(key)?.get(subkey).cloned()
    }

    fn set(&mut self, key: &str, subkey: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.values
                    .entry(key.to_string())
                    .or_default()
                    .insert(subkey.to_string(), value);
            }
            None => {
                if let Some(row) = self.values.get_mut(key) {
                    row.remove(subkey);
                    if row.is_empty() {
                        self.values.remove(key);
                    }
                }
            }
        }
    }

    fn update(&mut self, key: &str, subkey: &str, f: &UpdateFn<'_>) -> StoreResult<Option<String>> {
        let next = f(self.get(key, subkey).as_deref())?;
        self.set(key, subkey, next.clone());
        Ok(next)
    }

    fn transact(
        &mut self,
        entries: &[(&str, &str)],
        f: &TransactFn<'_>,
    ) -> StoreResult<Vec<Option<String>>> {
        let mut values: Vec<_> = entries.iter().map(|(key, subkey)| self.get(key, subkey)).collect();
        f(&mut values)?;
        for ((key, subkey), value) in entries.iter().zip(&values) {
            self.set(key, subkey, value.clone());
        }
        Ok(values)
    }

    fn subkey_entries(&self, subkey: &str) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter_map(|(key, row)| row.get(subkey).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    fn history(&self, key: &str, subkey: &str, limit: usize) -> Vec<String> {
        self.history
            .get(key)
            .and_then(|row| row.get(subkey))
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    fn prepend(&mut self, key: &str, subkey: &str, value: &str, max_len: usize) {
        let entries = self
            .history
            .entry(key.to_string())
            .or_default()
            .entry(subkey.to_string())
            .or_default();
        entries.push_front(value.to_string());
        entries.truncate(max_len);
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

/// Volatile store, lost on restart. Default for tests and the console demo.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: parking_lot::Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn get_value(&self, key: &str, subkey: &str) -> StoreResult<Option<String>> {
        Ok(self.tables.lock().get(key, subkey))
    }

    async fn set_value(&self, key: &str, subkey: &str, value: &str) -> StoreResult<()> {
        self.tables.lock().set(key, subkey, Some(value.to_string()));
        Ok(())
    }

    async fn remove_value(&self, key: &str, subkey: &str) -> StoreResult<()> {
        self.tables.lock().set(key, subkey, None);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        subkey: &str,
        f: &UpdateFn<'_>,
    ) -> StoreResult<Option<String>> {
        self.tables.lock().update(key, subkey, f)
    }

    async fn transact(
        &self,
        entries: &[(&str, &str)],
        f: &TransactFn<'_>,
    ) -> StoreResult<Vec<Option<String>>> {
        self.tables.lock().transact(entries, f)
    }

    async fn subkey_entries(&self, subkey: &str) -> StoreResult<Vec<(String, String)>> {
        Ok(self.tables.lock().subkey_entries(subkey))
    }

    async fn history(&self, key: &str, subkey: &str, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self.tables.lock().history(key, subkey, limit))
    }

    async fn prepend_value(
        &self,
        key: &str,
        subkey: &str,
        value: &str,
        max_len: usize,
    ) -> StoreResult<()> {
        self.tables.lock().prepend(key, subkey, value, max_len);
        Ok(())
    }
}

// ─── FileStore ────────────────────────────────────────────────────────────────

/// Store persisted as one JSON document.
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so a crash leaves either the old or the new contents on disk.
/// Mutations are serialized by an async lock held across the write, and a
/// failed write leaves the in-memory tables untouched.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: tokio::sync::Mutex<Tables>,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories as needed.
    ///
    /// A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
        }

        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Tables::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                key: path.display().to_string(),
                subkey: String::new(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };

        tracing::debug!(path = %path.display(), keys = tables.values.len(), "Opened JSON store");
        Ok(Self {
            path,
            tables: tokio::sync::Mutex::new(tables),
        })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `f` to a copy of the tables and keeps it once it is on disk.
    async fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *tables = next;
        Ok(out)
    }

    async fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(tables).map_err(|e| StoreError::Serialization {
            key: self.path.display().to_string(),
            subkey: String::new(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to replace store file");
            StoreError::Io(format!("{}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl Store for FileStore {
    fn engine(&self) -> &'static str {
        "json"
    }

    async fn get_value(&self, key: &str, subkey: &str) -> StoreResult<Option<String>> {
        Ok(self.tables.lock().await.get(key, subkey))
    }

    async fn set_value(&self, key: &str, subkey: &str, value: &str) -> StoreResult<()> {
        self.mutate(|tables| {
            tables.set(key, subkey, Some(value.to_string()));
            Ok(())
        })
        .await
    }

    async fn remove_value(&self, key: &str, subkey: &str) -> StoreResult<()> {
        self.mutate(|tables| {
            tables.set(key, subkey, None);
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        key: &str,
        subkey: &str,
        f: &UpdateFn<'_>,
    ) -> StoreResult<Option<String>> {
        self.mutate(|tables| tables.update(key, subkey, f)).await
    }

    async fn transact(
        &self,
        entries: &[(&str, &str)],
        f: &TransactFn<'_>,
    ) -> StoreResult<Vec<Option<String>>> {
        self.mutate(|tables| tables.transact(entries, f)).await
    }

    async fn subkey_entries(&self, subkey: &str) -> StoreResult<Vec<(String, String)>> {
        Ok(self.tables.lock().await.subkey_entries(subkey))
    }

    async fn history(&self, key: &str, subkey: &str, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self.tables.lock().await.history(key, subkey, limit))
    }

    async fn prepend_value(
        &self,
        key: &str,
        subkey: &str,
        value: &str,
        max_len: usize,
    ) -> StoreResult<()> {
        self.mutate(|tables| {
            tables.prepend(key, subkey, value, max_len);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get_value("alice", "coins").await.unwrap(), None);
        store.set_value("alice", "coins", "10").await.unwrap();
        assert_eq!(
            store.get_value("alice", "coins").await.unwrap().as_deref(),
            Some("10")
        );
        store.remove_value("alice", "coins").await.unwrap();
        assert_eq!(store.get_value("alice", "coins").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("bob", "coins", 5).await.unwrap(), 5);
        assert_eq!(store.increment("bob", "coins", -2).await.unwrap(), 3);

        store.set_value("bob", "name", "Bob").await.unwrap();
        assert!(matches!(
            store.increment("bob", "name", 1).await,
            Err(StoreError::NotAnInteger { .. })
        ));
        assert_eq!(
            store.get_value("bob", "name").await.unwrap().as_deref(),
            Some("Bob")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(MemoryStore::new());
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("pot", "coins", 2).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.increment("pot", "coins", 0).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        let mut inventory = HashMap::new();
        inventory.insert("sword".to_string(), 1u32);
        store.set_json("alice", "inventory", &inventory).await.unwrap();

        let loaded: HashMap<String, u32> = store.get_json("alice", "inventory").await.unwrap().unwrap();
        assert_eq!(loaded, inventory);

        let updated: Vec<String> = store
            .update_json("alice", "titles", |current: Option<Vec<String>>| {
                let mut titles = current.unwrap_or_default();
                titles.push("champion".into());
                titles
            })
            .await
            .unwrap();
        assert_eq!(updated, vec!["champion".to_string()]);

        store.set_value("alice", "broken", "{nope").await.unwrap();
        assert!(matches!(
            store.get_json::<Vec<String>>("alice", "broken").await,
            Err(StoreError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_subkey_entries() {
        let store = MemoryStore::new();
        store.set_value("irc:#a", "cooldown", "1").await.unwrap();
        store.set_value("irc:#b", "cooldown", "2").await.unwrap();
        store.set_value("irc:#b", "coins", "3").await.unwrap();
        let entries = store.subkey_entries("cooldown").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("irc:#a".to_string(), "1".to_string()),
                ("irc:#b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_history_bounded_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .prepend_value("alice", "bets", &i.to_string(), 3)
                .await
                .unwrap();
        }
        assert_eq!(store.history("alice", "bets", 10).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.history("alice", "bets", 1).await.unwrap(), vec!["4"]);
        assert!(store.history("bob", "bets", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(&path).await.unwrap();
        store.set_value("alice", "coins", "7").await.unwrap();
        store.increment("alice", "coins", 3).await.unwrap();
        store.prepend_value("alice", "bets", "won", 5).await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.engine(), "json");
        assert_eq!(
            reopened.get_value("alice", "coins").await.unwrap().as_deref(),
            Some("10")
        );
        assert_eq!(reopened.history("alice", "bets", 5).await.unwrap(), vec!["won"]);
    }

    fn transfer(amount: i64) -> impl Fn(&mut [Option<String>]) -> StoreResult<()> + Send + Sync {
        move |values: &mut [Option<String>]| {
            let [from, to] = values else {
                return Err(StoreError::Io("expected two entries".into()));
            };
            let balance = |v: &Option<String>| v.as_deref().and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
            let have = balance(&*from);
            if have < amount {
                return Err(StoreError::Io("insufficient funds".into()));
            }
            let total = balance(&*to) + amount;
            *from = Some((have - amount).to_string());
            *to = Some(total.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transact_moves_value_between_entries() {
        let store = MemoryStore::new();
        store.set_value("alice", "coins", "10").await.unwrap();

        let stored = store
            .transact(&[("alice", "coins"), ("bob", "coins")], &transfer(4))
            .await
            .unwrap();
        assert_eq!(stored, vec![Some("6".to_string()), Some("4".to_string())]);

        assert!(store
            .transact(&[("alice", "coins"), ("bob", "coins")], &transfer(100))
            .await
            .is_err());
        assert_eq!(store.get_value("alice", "coins").await.unwrap().as_deref(), Some("6"));
        assert_eq!(store.get_value("bob", "coins").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_file_store_transact_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).await.unwrap();
        store.set_value("alice", "coins", "10").await.unwrap();
        store
            .transact(&[("alice", "coins"), ("bob", "coins")], &transfer(3))
            .await
            .unwrap();
        assert!(store
            .transact(&[("alice", "coins"), ("bob", "coins")], &transfer(50))
            .await
            .is_err());
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_value("alice", "coins").await.unwrap().as_deref(), Some("7"));
        assert_eq!(reopened.get_value("bob", "coins").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_file_store_failed_write_keeps_old_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).await.unwrap();
        store.set_value("alice", "coins", "5").await.unwrap();

        // A directory in place of the document makes the rename fail.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        assert!(matches!(
            store.set_value("alice", "coins", "99").await,
            Err(StoreError::Io(_))
        ));
        assert!(store.set_value("bob", "coins", "1").await.is_err());
        assert!(store.remove_value("alice", "coins").await.is_err());
        assert!(store.increment("alice", "coins", 1).await.is_err());

        assert_eq!(store.get_value("alice", "coins").await.unwrap().as_deref(), Some("5"));
        assert_eq!(store.get_value("bob", "coins").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            FileStore::open(&path).await,
            Err(StoreError::Serialization { .. })
        ));
    }
}
