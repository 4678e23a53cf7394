//! Insert-if-absent writes with three-way outcomes.
//!
//! An entity or relation that already exists is skipped without a write. A
//! write that loses a race to another writer surfaces as a duplicate and is
//! also skipped. Anything else is counted as failed and dead-lettered with
//! the attempted statement and the source payload so it can be replayed.

use serde_json::Value as JsonValue;

use super::stats::CollectionStats;
use crate::deadletter::{
    DeadLetter, DeadLetterSink, REASON_INSERT_FAILED, REASON_RELATION_INSERT_FAILED,
};
use crate::error::{Result, StoreError};
use crate::graph::{GraphStore, RelationPattern, WriteStatement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Skipped,
    Failed,
}

/// Which counters an upsert lands on.
#[derive(Debug, Clone, Copy)]
enum Tally {
    Entity,
    Relation,
}

impl Tally {
    fn record(self, stats: &mut CollectionStats, outcome: UpsertOutcome) {
        let counter = match (self, outcome) {
            (Tally::Entity, UpsertOutcome::Inserted) => &mut stats.inserted,
            (Tally::Entity, UpsertOutcome::Skipped) => &mut stats.skipped,
            (Tally::Entity, UpsertOutcome::Failed) => &mut stats.failed,
            (Tally::Relation, UpsertOutcome::Inserted) => &mut stats.relations_inserted,
            (Tally::Relation, UpsertOutcome::Skipped) => &mut stats.relations_skipped,
            (Tally::Relation, UpsertOutcome::Failed) => &mut stats.relation_failed,
        };
        *counter += 1;
    }

    fn failure_reason(self) -> &'static str {
        match self {
            Tally::Entity => REASON_INSERT_FAILED,
            Tally::Relation => REASON_RELATION_INSERT_FAILED,
        }
    }
}

/// Runs upserts against a store, or counts them without one (dry-run).
#[derive(Clone, Copy)]
pub struct Upserter<'a> {
    store: Option<&'a dyn GraphStore>,
    sink: &'a DeadLetterSink,
}

impl<'a> Upserter<'a> {
    pub fn new(store: Option<&'a dyn GraphStore>, sink: &'a DeadLetterSink) -> Self {
        Self { store, sink }
    }

    pub fn is_dry_run(&self) -> bool {
        self.store.is_none()
    }

    pub fn sink(&self) -> &'a DeadLetterSink {
        self.sink
    }

    /// Upsert the record's own entity; counts on the entity counters.
    pub async fn upsert_entity(
        &self,
        stats: &mut CollectionStats,
        collection: &str,
        source_id: &str,
        statement: &WriteStatement,
        payload: &JsonValue,
    ) -> Result<UpsertOutcome> {
        self.upsert(Tally::Entity, stats, collection, source_id, statement, payload)
            .await
    }

    /// Upsert an entity written on behalf of a record (a text chunk, for
    /// instance); counts on the relation counters.
    pub async fn upsert_auxiliary_entity(
        &self,
        stats: &mut CollectionStats,
        collection: &str,
        source_id: &str,
        statement: &WriteStatement,
        payload: &JsonValue,
    ) -> Result<UpsertOutcome> {
        self.upsert(Tally::Relation, stats, collection, source_id, statement, payload)
            .await
    }

    pub async fn upsert_relation(
        &self,
        stats: &mut CollectionStats,
        collection: &str,
        source_id: &str,
        pattern: RelationPattern,
        payload: &JsonValue,
    ) -> Result<UpsertOutcome> {
        let statement = WriteStatement::InsertRelation(pattern);
        self.upsert(Tally::Relation, stats, collection, source_id, &statement, payload)
            .await
    }

    async fn upsert(
        &self,
        tally: Tally,
        stats: &mut CollectionStats,
        collection: &str,
        source_id: &str,
        statement: &WriteStatement,
        payload: &JsonValue,
    ) -> Result<UpsertOutcome> {
        let outcome = match self.store {
            None => UpsertOutcome::Inserted,
            Some(store) => match write_if_absent(store, statement).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::debug!("[{}] write failed for {}: {}", collection, source_id, e);
                    let letter = DeadLetter::new(
                        collection,
                        Some(source_id.to_string()),
                        tally.failure_reason(),
                        payload.clone(),
                    )
                    .with_error(&e)
                    .with_query(statement);
                    self.sink.write(letter)?;
                    UpsertOutcome::Failed
                }
            },
        };
        tally.record(stats, outcome);
        Ok(outcome)
    }
}

async fn write_if_absent(
    store: &dyn GraphStore,
    statement: &WriteStatement,
) -> std::result::Result<UpsertOutcome, StoreError> {
    let present = match statement {
        WriteStatement::InsertEntity {
            entity_type,
            key_attr,
            key_value,
            ..
        } => store.exists(entity_type, key_attr, key_value).await?,
        WriteStatement::InsertRelation(pattern) => store.exists_relation(pattern).await?,
    };
    if present {
        return Ok(UpsertOutcome::Skipped);
    }
    match store.run_write(statement).await {
        Ok(()) => Ok(UpsertOutcome::Inserted),
        Err(e) if e.is_duplicate() => Ok(UpsertOutcome::Skipped),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadletter::read_entries;
    use crate::ingest::testing::{sqlite_store, ScriptedStore};
    use crate::graph::RolePlayer;
    use crate::value::Literal;
    use serde_json::json;
    use tempfile::TempDir;

    fn project(key: &str) -> WriteStatement {
        WriteStatement::entity(
            "project",
            "project_id",
            key,
            vec![("name".to_string(), Literal::String("Alpha".into()))],
        )
    }

    fn sink(temp_dir: &TempDir) -> DeadLetterSink {
        DeadLetterSink::open(temp_dir.path().join("dl.ndjson")).unwrap()
    }

    #[tokio::test]
    async fn test_entity_upsert_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = sqlite_store(&temp_dir).await;
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(Some(&store), &sink);
        let mut stats = CollectionStats::new("projects");
        let payload = json!({"_id": "p1"});

        let first = upserter
            .upsert_entity(&mut stats, "projects", "p1", &project("p1"), &payload)
            .await
            .unwrap();
        let second = upserter
            .upsert_entity(&mut stats, "projects", "p1", &project("p1"), &payload)
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Skipped);
        assert_eq!((stats.inserted, stats.skipped, stats.failed), (1, 1, 0));
        assert!(read_entries(sink.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_store() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(None, &sink);
        let mut stats = CollectionStats::new("projects");

        let outcome = upserter
            .upsert_entity(&mut stats, "projects", "p1", &project("p1"), &json!({}))
            .await
            .unwrap();
        assert!(upserter.is_dry_run());
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(stats.inserted, 1);
    }

    #[tokio::test]
    async fn test_duplicate_on_write_is_skipped_without_dead_letter() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScriptedStore::default().fail_writes_with(|| StoreError::Duplicate("raced".into()));
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(Some(&store), &sink);
        let mut stats = CollectionStats::new("projects");

        let outcome = upserter
            .upsert_entity(&mut stats, "projects", "p1", &project("p1"), &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);
        assert_eq!((stats.skipped, stats.failed), (1, 0));
        assert!(read_entries(sink.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_write_error_is_dead_lettered_with_query() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            ScriptedStore::default().fail_writes_with(|| StoreError::SchemaViolation("bad".into()));
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(Some(&store), &sink);
        let mut stats = CollectionStats::new("projects");
        let statement = project("p1");

        let outcome = upserter
            .upsert_entity(&mut stats, "projects", "p1", &statement, &json!({"_id": "p1"}))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Failed);
        assert_eq!(stats.failed, 1);

        let entries = read_entries(sink.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, REASON_INSERT_FAILED);
        assert_eq!(entries[0].source_id.as_deref(), Some("p1"));
        assert_eq!(entries[0].query.as_deref(), Some(statement.to_string().as_str()));
        assert!(entries[0].error.as_deref().unwrap().contains("bad"));
        assert_eq!(entries[0].payload, json!({"_id": "p1"}));
    }

    #[tokio::test]
    async fn test_relation_and_auxiliary_use_relation_counters() {
        let temp_dir = TempDir::new().unwrap();
        let store = sqlite_store(&temp_dir).await;
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(Some(&store), &sink);
        let mut stats = CollectionStats::new("tasks");

        upserter
            .upsert_entity(&mut stats, "tasks", "p1", &project("p1"), &json!({}))
            .await
            .unwrap();
        let chunk = WriteStatement::entity("project", "project_id", "p2", Vec::new());
        upserter
            .upsert_auxiliary_entity(&mut stats, "tasks", "p1", &chunk, &json!({}))
            .await
            .unwrap();
        let link = RelationPattern {
            relation: "project_link".into(),
            players: [
                RolePlayer::new("from", "project", "project_id", "p1"),
                RolePlayer::new("to", "project", "project_id", "p2"),
            ],
        };
        for _ in 0..2 {
            upserter
                .upsert_relation(&mut stats, "tasks", "p1", link.clone(), &json!({}))
                .await
                .unwrap();
        }
        let missing = RelationPattern {
            relation: "project_link".into(),
            players: [
                RolePlayer::new("from", "project", "project_id", "p1"),
                RolePlayer::new("to", "project", "project_id", "nope"),
            ],
        };
        let outcome = upserter
            .upsert_relation(&mut stats, "tasks", "p1", missing, &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Failed);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.relations_inserted, 2);
        assert_eq!(stats.relations_skipped, 1);
        assert_eq!(stats.relation_failed, 1);
        let entries = read_entries(sink.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, REASON_RELATION_INSERT_FAILED);
    }

    #[tokio::test]
    async fn test_existence_check_error_counts_failed() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScriptedStore::default().fail_reads();
        let sink = sink(&temp_dir);
        let upserter = Upserter::new(Some(&store), &sink);
        let mut stats = CollectionStats::new("projects");

        let outcome = upserter
            .upsert_entity(&mut stats, "projects", "p1", &project("p1"), &json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Failed);
        assert_eq!(store.writes(), 0);
        assert_eq!(read_entries(sink.path()).unwrap()[0].reason, REASON_INSERT_FAILED);
    }
}
