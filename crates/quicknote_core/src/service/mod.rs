//! Core use-case services.
//!
//! # Responsibility
//! - Apply caller-side rules (validation, date stamping, paging defaults)
//!   before delegating to repositories.
//! - Keep HTTP/CLI layers decoupled from storage details.

pub mod note_service;
