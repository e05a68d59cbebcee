//! Storage backends for the mail archive
//!
//! The daemon runs on SQLite; the in-memory store backs fast tests.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStashStore;
pub use sqlite::SqliteStashStore;
pub use traits::StashStore;
