//! Shared request state.

use crate::error::ApiError;
use quicknote_core::db::open_db;
use quicknote_core::{KvNoteRepository, NoteService, NoteServiceError, SqliteKvStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type SqliteNoteService<'conn> = NoteService<KvNoteRepository<SqliteKvStore<'conn>>>;

/// Holds only the database location; connections are per request.
#[derive(Debug, Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
        }
    }

    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `f` against a freshly opened service on a blocking worker.
    pub async fn with_service<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteNoteService<'_>) -> Result<T, NoteServiceError> + Send + 'static,
    {
        let db_path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let conn = open_db(db_path.as_path())
                .map_err(|err| ApiError::Internal(format!("db open failed: {err}")))?;
            let store = SqliteKvStore::try_new(&conn)
                .map_err(|err| ApiError::Internal(format!("store init failed: {err}")))?;
            let service = NoteService::new(KvNoteRepository::new(store));
            f(&service).map_err(ApiError::from)
        })
        .await
        .map_err(|err| ApiError::Internal(format!("blocking task failed: {err}")))?
    }
}
