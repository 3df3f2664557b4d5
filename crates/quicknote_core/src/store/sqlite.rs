//! SQLite-backed key-value store.
//!
//! Values live in `kv_entries`; `apply` runs inside one transaction so a
//! record write and its index write land together. `update` holds the
//! database write lock (`BEGIN IMMEDIATE`) from its first read to commit, so
//! concurrent connections serialize their read-modify-write cycles.

use super::{KvOp, KvStore, StoreError, StoreResult};
use log::{debug, error};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

const KV_TABLE: &str = "kv_entries";

/// Key-value store over a migrated SQLite connection.
pub struct SqliteKvStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKvStore<'conn> {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    ///
    /// # Errors
    /// - `StoreError::MissingTable` when migrations have not created `kv_entries`.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        if !table_exists(conn, KV_TABLE)? {
            return Err(StoreError::MissingTable(KV_TABLE));
        }
        Ok(Self { conn })
    }
}

impl KvStore for SqliteKvStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        put_entry(self.conn, key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        delete_entry(self.conn, key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key
             FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC;",
        )?;
        let mut rows = stmt.query([prefix])?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next()? {
            keys.push(row.get::<_, String>(0)?);
        }
        Ok(keys)
    }

    fn apply(&self, ops: &[KvOp]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        // Dropping `tx` on error rolls back the earlier ops.
        write_ops(&tx, ops)?;
        tx.commit()?;
        debug!("event=kv_apply module=store status=ok ops={}", ops.len());
        Ok(())
    }

    fn update<T, E, F>(&self, plan: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
        F: FnOnce() -> Result<(Vec<KvOp>, T), E>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let (ops, output) = plan()?;
        write_ops(&tx, &ops)?;
        tx.commit().map_err(StoreError::from)?;
        debug!("event=kv_update module=store status=ok ops={}", ops.len());
        Ok(output)
    }
}

fn write_ops(conn: &Connection, ops: &[KvOp]) -> StoreResult<()> {
    for op in ops {
        let result = match op {
            KvOp::Put { key, value } => put_entry(conn, key, value),
            KvOp::Delete { key } => delete_entry(conn, key),
        };
        if let Err(err) = result {
            error!(
                "event=kv_apply module=store status=error ops={} failed_key={} error={}",
                ops.len(),
                op.key(),
                err
            );
            return Err(err);
        }
    }
    Ok(())
}

fn put_entry(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO kv_entries (key, value, updated_at)
         VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER) * 1000)
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at;",
        params![key, value],
    )?;
    Ok(())
}

fn delete_entry(conn: &Connection, key: &str) -> StoreResult<()> {
    conn.execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
