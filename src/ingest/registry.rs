use std::collections::HashMap;

use super::chunking::ingest_chunked_document;
use super::handler::{ingest_document, IngestContext};
use super::stats::CollectionStats;
use crate::error::{Result, SyncError};
use crate::mapping::{ChunkingSpec, MappingConfig, MappingEntry};
use crate::value::Document;

/// How records of one collection are turned into graph writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    Generic,
    ChunkedText(ChunkingSpec),
}

impl Handler {
    pub async fn handle(
        &self,
        ctx: &IngestContext<'_>,
        entry: &MappingEntry,
        doc: &Document,
    ) -> Result<CollectionStats> {
        match self {
            Handler::Generic => ingest_document(ctx, entry, doc).await,
            Handler::ChunkedText(spec) => ingest_chunked_document(ctx, entry, spec, doc).await,
        }
    }
}

/// Collection name to handler, built once per run.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn resolve(mapping: &MappingConfig) -> Self {
        let handlers = mapping
            .entries()
            .iter()
            .map(|entry| {
                let handler = match &entry.chunking {
                    Some(spec) => Handler::ChunkedText(spec.clone()),
                    None => Handler::Generic,
                };
                (entry.collection.clone(), handler)
            })
            .collect();
        Self { handlers }
    }

    pub fn get(&self, collection: &str) -> Result<&Handler> {
        self.handlers.get(collection).ok_or_else(|| {
            SyncError::Config(format!("No handler for collection: {}", collection))
        })
    }
}
