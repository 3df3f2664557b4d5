//! Note domain model and key layout.
//!
//! # Responsibility
//! - Define the persisted `Note` shape and the upsert input `NoteDraft`.
//! - Own the key naming for records (`note:<id>`) and the index (`notesIndex`).
//!
//! # Invariants
//! - A note id never changes after creation.
//! - Every stored note has a non-empty id.

pub mod note;
