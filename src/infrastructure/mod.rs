//! Infrastructure layer - external adapters (page documents, storage, config files).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod document;
pub mod selector;
pub mod sqlite_store;
pub mod store;

pub use config::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
};
pub use document::{DocumentAccessor, PageNode, SnapshotDocument};
pub use selector::Selector;
pub use sqlite_store::{SqliteStore, HISTORY_NAMESPACE};
pub use store::{KeyValueStore, MemoryStore};
