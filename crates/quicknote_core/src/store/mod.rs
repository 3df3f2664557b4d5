//! Key-value store contract and implementations.
//!
//! # Responsibility
//! - Define the per-key get/put/delete contract the note repository relies on.
//! - Provide a SQLite-backed store and a process-local store for tests.
//!
//! # Invariants
//! - Single-key operations are atomic.
//! - `apply` preserves op order; only implementations that document it are
//!   atomic across keys.
//! - `update` isolates its reads from concurrent writers only where the
//!   implementation documents it.
//! - Store logs carry keys only, never values.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Transport-level failure raised by a key-value store.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Backend is missing the `kv_entries` table (migrations not applied).
    MissingTable(&'static str),
    /// Backend refused the operation (injected faults, poisoned locks).
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingTable(table) => write!(f, "missing required table `{table}`"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingTable(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// One write in an ordered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: String, value: String },
    Delete { key: String },
}

impl KvOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Per-key storage contract.
pub trait KvStore {
    /// Reads one value, `None` when the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    /// Inserts or replaces one value.
    fn put(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Removes one key. Absent keys are a no-op.
    fn delete(&self, key: &str) -> StoreResult<()>;
    /// Returns all keys starting with `prefix`, sorted ascending.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Applies writes in order, stopping at the first failure.
    ///
    /// The default implementation is not atomic: ops before the failing one
    /// stay applied.
    fn apply(&self, ops: &[KvOp]) -> StoreResult<()> {
        for op in ops {
            match op {
                KvOp::Put { key, value } => self.put(key, value)?,
                KvOp::Delete { key } => self.delete(key)?,
            }
        }
        Ok(())
    }

    /// Runs `plan` and applies the ops it returns as one read-modify-write.
    ///
    /// Reads made through this store inside `plan` must not be invalidated by
    /// another writer before the ops land. A `plan` error writes nothing.
    ///
    /// The default implementation has no isolation: it calls `plan` and then
    /// `apply`.
    fn update<T, E, F>(&self, plan: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
        F: FnOnce() -> Result<(Vec<KvOp>, T), E>,
    {
        let (ops, output) = plan()?;
        self.apply(&ops)?;
        Ok(output)
    }
}

impl<S: KvStore> KvStore for &S {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }

    fn apply(&self, ops: &[KvOp]) -> StoreResult<()> {
        (**self).apply(ops)
    }

    fn update<T, E, F>(&self, plan: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
        F: FnOnce() -> Result<(Vec<KvOp>, T), E>,
    {
        (**self).update(plan)
    }
}
