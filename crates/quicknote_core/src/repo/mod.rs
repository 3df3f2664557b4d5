//! Repository layer: note persistence over a key-value store.
//!
//! # Responsibility
//! - Keep `note:<id>` records and the `notesIndex` ordering key in step.
//! - Isolate key layout and JSON encoding from service orchestration.
//!
//! # Invariants
//! - Repository writes never validate note content; callers do.
//! - Read paths heal stale index entries instead of failing on them.

pub mod note_repo;
