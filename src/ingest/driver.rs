//! Batch run over the selected collections.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;

use super::handler::IngestContext;
use super::registry::HandlerRegistry;
use super::stats::CollectionStats;
use super::upsert::Upserter;
use crate::db::SqliteGraphStore;
use crate::deadletter::DeadLetterSink;
use crate::error::{Result, SyncError};
use crate::graph::GraphStore;
use crate::mapping::MappingConfig;
use crate::schema::SchemaMetadata;
use crate::source::DocumentSource;

pub const DEFAULT_PROGRESS_EVERY: u64 = 500;

/// Fully resolved options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Write to the graph store; otherwise count only.
    pub apply: bool,
    /// Create or migrate the graph store before writing.
    pub init_schema: bool,
    pub limit: Option<usize>,
    /// Collections to run, in order.
    pub collections: Vec<String>,
}

impl RunOptions {
    /// Check launcher input against the mapping.
    ///
    /// `collections` is a comma-separated subset; `None` selects every
    /// mapped collection in mapping order.
    pub fn resolve(
        apply: bool,
        init_schema: bool,
        limit: Option<i64>,
        collections: Option<&str>,
        mapping: &MappingConfig,
    ) -> Result<Self> {
        let limit = match limit {
            None => None,
            Some(n) if n > 0 => Some(n as usize),
            Some(n) => {
                return Err(SyncError::InvalidInput(format!("Invalid --limit value: {}", n)))
            }
        };

        let collections = match collections {
            None => mapping.collections(),
            Some(list) => {
                let names: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(SyncError::InvalidInput(
                        "No collections selected by --collections".to_string(),
                    ));
                }
                names
            }
        };

        let missing: Vec<&str> = collections
            .iter()
            .filter(|name| mapping.get(name).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing collections in mapping: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            apply,
            init_schema,
            limit,
            collections,
        })
    }

    pub fn mode(&self) -> &'static str {
        if self.apply {
            "apply"
        } else {
            "dry-run"
        }
    }
}

/// Open the graph store an apply run writes to. Dry-runs get none.
pub async fn open_graph_store(
    options: &RunOptions,
    db_path: &Path,
    migrations_dir: &Path,
    schema: Arc<SchemaMetadata>,
) -> Result<Option<SqliteGraphStore>> {
    if !options.apply {
        return Ok(None);
    }
    let store = if options.init_schema {
        SqliteGraphStore::init_schema(db_path, migrations_dir, Some(schema)).await?
    } else {
        SqliteGraphStore::open_existing(db_path, Some(schema)).await?
    };
    Ok(Some(store))
}

pub struct IngestDriver {
    schema: Arc<SchemaMetadata>,
    mapping: Arc<MappingConfig>,
    registry: HandlerRegistry,
    source: Arc<dyn DocumentSource>,
    store: Option<Arc<dyn GraphStore>>,
    sink: Arc<DeadLetterSink>,
    progress_every: u64,
    concurrency: usize,
}

impl IngestDriver {
    pub fn new(
        schema: Arc<SchemaMetadata>,
        mapping: Arc<MappingConfig>,
        source: Arc<dyn DocumentSource>,
        sink: Arc<DeadLetterSink>,
    ) -> Self {
        let registry = HandlerRegistry::resolve(&mapping);
        Self {
            schema,
            mapping,
            registry,
            source,
            store: None,
            sink,
            progress_every: DEFAULT_PROGRESS_EVERY,
            concurrency: 1,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run every selected collection, one after another.
    pub async fn run(&self, options: &RunOptions) -> Result<Vec<CollectionStats>> {
        let store = match (options.apply, &self.store) {
            (true, Some(store)) => Some(&**store),
            (true, None) => {
                return Err(SyncError::Config(
                    "apply mode needs a graph store".to_string(),
                ))
            }
            (false, _) => None,
        };

        log::info!(
            "mode={} limit={} collections={}",
            options.mode(),
            options
                .limit
                .map(|n| n.to_string())
                .unwrap_or_else(|| "none".to_string()),
            options.collections.join(",")
        );

        let mut all = Vec::with_capacity(options.collections.len());
        for collection in &options.collections {
            let stats = self.run_collection(collection, options.limit, store).await?;
            all.push(stats);
        }
        Ok(all)
    }

    async fn run_collection(
        &self,
        collection: &str,
        limit: Option<usize>,
        store: Option<&dyn GraphStore>,
    ) -> Result<CollectionStats> {
        let entry = self.mapping.get(collection).ok_or_else(|| {
            SyncError::Config(format!("Collection is not defined in mapping: {}", collection))
        })?;
        let handler = self.registry.get(collection)?;
        let ctx = IngestContext::new(&self.schema, Upserter::new(store, &self.sink));

        let started = Instant::now();
        let mut stats = CollectionStats::new(collection);
        log::info!("[{}] start", collection);

        let docs = self.source.documents(collection, limit).await?;
        let mut deltas = docs
            .map(|doc| async move {
                let doc = doc?;
                handler.handle(&ctx, entry, &doc).await
            })
            .buffer_unordered(self.concurrency);

        while let Some(delta) = deltas.next().await {
            stats.merge(&delta?);
            stats.scanned += 1;
            if stats.scanned % self.progress_every == 0 {
                log::info!("[{}] progress scanned={}", collection, stats.scanned);
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        log::info!("{} done duration_ms={}", stats, stats.duration_ms);
        Ok(stats)
    }
}
