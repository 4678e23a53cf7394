//! Document-to-graph ingestion: handlers, upserts and the batch driver.

pub mod chunking;
pub mod driver;
pub mod handler;
pub mod registry;
pub mod roles;
pub mod stats;
pub mod upsert;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{chunk_key, ingest_chunked_document};
pub use driver::{open_graph_store, IngestDriver, RunOptions, DEFAULT_PROGRESS_EVERY};
pub use handler::{ingest_document, IngestContext};
pub use registry::{Handler, HandlerRegistry};
pub use roles::resolve_roles;
pub use stats::CollectionStats;
pub use upsert::{UpsertOutcome, Upserter};
