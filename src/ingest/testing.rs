//! Store doubles shared by the ingest tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::db::SqliteGraphStore;
use crate::error::StoreError;
use crate::graph::{CountQuery, GraphStore, RelationPattern, StoreResult, WriteStatement};
use crate::schema::SchemaMetadata;

fn migrations() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

pub async fn sqlite_store(temp_dir: &TempDir) -> SqliteGraphStore {
    SqliteGraphStore::init_schema(&temp_dir.path().join("graph.db"), &migrations(), None)
        .await
        .unwrap()
}

pub async fn sqlite_store_with_schema(temp_dir: &TempDir, schema: Arc<SchemaMetadata>) -> SqliteGraphStore {
    SqliteGraphStore::init_schema(&temp_dir.path().join("graph.db"), &migrations(), Some(schema))
        .await
        .unwrap()
}

/// Store that reports nothing as present and fails on demand.
#[derive(Default)]
pub struct ScriptedStore {
    write_error: Option<fn() -> StoreError>,
    fail_reads: bool,
    writes: AtomicUsize,
    statements: Mutex<Vec<WriteStatement>>,
}

impl ScriptedStore {
    pub fn fail_writes_with(mut self, error: fn() -> StoreError) -> Self {
        self.write_error = Some(error);
        self
    }

    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<WriteStatement> {
        self.statements.lock().unwrap().clone()
    }

    fn read(&self) -> StoreResult<bool> {
        if self.fail_reads {
            return Err(StoreError::Unmatched("read refused".into()));
        }
        Ok(false)
    }
}

#[async_trait]
impl GraphStore for ScriptedStore {
    async fn exists(&self, _entity_type: &str, _key_attr: &str, _key_value: &str) -> StoreResult<bool> {
        self.read()
    }

    async fn exists_relation(&self, _pattern: &RelationPattern) -> StoreResult<bool> {
        self.read()
    }

    async fn run_write(&self, statement: &WriteStatement) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().unwrap().push(statement.clone());
        match self.write_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn count(&self, _query: &CountQuery) -> StoreResult<u64> {
        Ok(0)
    }
}
