pub mod config;
pub mod db;
pub mod deadletter;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod mapping;
pub mod schema;
pub mod source;
pub mod validate;
pub mod value;

pub use config::Config;
pub use error::{Result, StoreError, SyncError};
pub use graph::GraphStore;
pub use ingest::{CollectionStats, IngestDriver, RunOptions};
