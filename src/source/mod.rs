//! Where source documents come from.
//!
//! A source yields the documents of one named collection, optionally capped
//! to the first `limit` records. Connection and cursor details stay behind
//! the trait.

mod memory;
mod ndjson;

#[cfg(feature = "mongodb")]
mod mongo;

pub use memory::MemorySource;
pub use ndjson::NdjsonSource;

#[cfg(feature = "mongodb")]
pub use mongo::MongoSource;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::value::Document;

pub type DocumentStream = BoxStream<'static, Result<Document>>;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stream the documents of `collection`, at most `limit` of them.
    async fn documents(&self, collection: &str, limit: Option<usize>) -> Result<DocumentStream>;
}
