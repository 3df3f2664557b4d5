//! Core domain logic for quicknote.
//! This crate owns note persistence and the index/record consistency rules.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget,
};
pub use model::note::{Note, NoteDraft, NoteId, NoteValidationError};
pub use repo::note_repo::{
    KvNoteRepository, NotePage, NoteRepository, ReadFailure, ReconcileReport, RepoError,
    RepoResult,
};
pub use service::note_service::{NoteService, NoteServiceError, NotesPage};
pub use store::{KvOp, KvStore, MemoryKvStore, SqliteKvStore, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
