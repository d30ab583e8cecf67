//! Storage implementations for extraction snapshots.
//!
//! Available backends:
//! - `MemorySnapshotStore` - In-memory storage (always available)
//! - `FileSnapshotStore` - One JSON file per entity (always available)
//! - `SqliteSnapshotStore` - SQLite file-based storage (requires `sqlite` feature)

pub mod file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSnapshotStore;
