//! Token storage backends for persisting captured OAuth tokens.
//!
//! Provides an in-memory store for testing and a SQLite-backed store for production.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTokenStore;
pub use sqlite::{SqliteTokenStore, StoreOptions};
