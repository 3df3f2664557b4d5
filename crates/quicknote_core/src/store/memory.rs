//! Process-local key-value store with fault injection.
//!
//! Used by tests and embedding callers that do not need durability. Writes
//! or reads of selected keys can be made to fail so partial-failure paths
//! (record written, index not) are reproducible.

use super::{KvStore, StoreError, StoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Faults {
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
}

/// `BTreeMap`-backed store. `apply` uses the non-atomic default.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
    faults: Mutex<Faults>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` of `key` fail.
    pub fn fail_reads_of(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.reads.insert(key.into());
        }
    }

    /// Makes every subsequent `put`/`delete` of `key` fail.
    pub fn fail_writes_of(&self, key: impl Into<String>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.writes.insert(key.into());
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn check_read(&self, key: &str) -> StoreResult<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault table lock poisoned".to_string()))?;
        if faults.reads.contains(key) {
            return Err(StoreError::Unavailable(format!("read of `{key}` rejected")));
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> StoreResult<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault table lock poisoned".to_string()))?;
        if faults.writes.contains(key) {
            return Err(StoreError::Unavailable(format!("write of `{key}` rejected")));
        }
        Ok(())
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_read(key)?;
        Ok(self.entries()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_write(key)?;
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_write(key)?;
        self.entries()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries()?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
