//! Graph storage backends
//!
//! A small, capability-complete interface shared by an in-memory backend
//! (tests) and a persistent SQLite backend. A network backend can be added
//! without touching consumers. Every mutation appends one record to the
//! append-only event log.

mod events;
mod memory;
mod sqlite;
mod traits;

pub use events::{EventLog, EventRecord};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    primary_key_field, require_primary_key, EdgeRecord, GraphStore, NodeRecord, Properties,
    StorageError, StorageResult,
};
