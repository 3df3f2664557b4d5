//! Route groups.

mod notes;

pub use notes::note_routes;
