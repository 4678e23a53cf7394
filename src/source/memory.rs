use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::{DocumentSource, DocumentStream};
use crate::error::Result;
use crate::value::Document;

/// In-process source; unknown collections are empty.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: HashMap<String, Vec<Document>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: impl Into<String>, docs: Vec<Document>) -> Self {
        self.collections.insert(name.into(), docs);
        self
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn documents(&self, collection: &str, limit: Option<usize>) -> Result<DocumentStream> {
        let docs = self.collections.get(collection).cloned().unwrap_or_default();
        let take = limit.unwrap_or(docs.len());
        Ok(stream::iter(docs.into_iter().take(take).map(Ok)).boxed())
    }
}
