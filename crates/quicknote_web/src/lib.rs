//! HTTP surface for quicknote.
//!
//! # Responsibility
//! - Map `/api/notes` requests onto `NoteService` calls.
//! - Emit JSON envelopes (`{notes,totalPages,currentPage}`, `{message}`,
//!   `{error}`) and CORS headers.
//!
//! # Invariants
//! - Every request opens its own store connection; no note state is held in
//!   process memory between requests.
//! - Storage failure details are logged, never returned to clients.

pub mod config;
pub mod routes;
pub mod server;

mod error;
mod state;

pub use config::ServerConfig;
pub use error::{ApiError, WebError};
pub use server::{build_router, start_server};
pub use state::AppState;
