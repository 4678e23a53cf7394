//! Post-ingestion checks over the graph store.
//!
//! Every check is a single count. Checks run independently and never write;
//! a check whose query fails is reported as a warning and the rest still run.

use std::fmt;

use crate::graph::{CountQuery, Filter, GraphStore};
use crate::value::Literal;

/// A named count with an optional warning predicate.
#[derive(Debug, Clone)]
pub struct AggregateCheck {
    pub name: String,
    pub query: CountQuery,
    pub warn_if: Option<fn(u64) -> bool>,
}

impl AggregateCheck {
    /// Informational count; never warns.
    pub fn total(name: impl Into<String>, entity: &str) -> Self {
        Self {
            name: name.into(),
            query: CountQuery::all(entity),
            warn_if: None,
        }
    }

    /// Count of offending entities; warns when there are any.
    pub fn violations(name: impl Into<String>, query: CountQuery) -> Self {
        Self {
            name: name.into(),
            query,
            warn_if: Some(any_found),
        }
    }
}

fn any_found(count: u64) -> bool {
    count > 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckLevel {
    Ok,
    Warn,
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckLevel::Ok => f.write_str("OK"),
            CheckLevel::Warn => f.write_str("WARN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub name: String,
    pub level: CheckLevel,
    /// `Err` carries the query failure text.
    pub value: Result<u64, String>,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Ok(count) => write!(f, "{} {}={}", self.level, self.name, count),
            Err(error) => write!(f, "{} {}=error: {}", self.level, self.name, error),
        }
    }
}

pub async fn run_check(store: &dyn GraphStore, check: &AggregateCheck) -> CheckReport {
    log::debug!("{}: {}", check.name, check.query);
    match store.count(&check.query).await {
        Ok(count) => {
            let warn = check.warn_if.is_some_and(|predicate| predicate(count));
            CheckReport {
                name: check.name.clone(),
                level: if warn { CheckLevel::Warn } else { CheckLevel::Ok },
                value: Ok(count),
            }
        }
        Err(e) => {
            log::warn!("Check {} failed: {}", check.name, e);
            CheckReport {
                name: check.name.clone(),
                level: CheckLevel::Warn,
                value: Err(e.to_string()),
            }
        }
    }
}

/// Run every check in order.
pub async fn run_checks(store: &dyn GraphStore, checks: &[AggregateCheck]) -> Vec<CheckReport> {
    let mut reports = Vec::with_capacity(checks.len());
    for check in checks {
        reports.push(run_check(store, check).await);
    }
    reports
}

fn not_related(relation: &str, own_role: &str, counterpart_role: &str) -> Filter {
    Filter::NotRelated {
        relation: relation.to_string(),
        own_role: own_role.to_string(),
        counterpart_role: counterpart_role.to_string(),
    }
}

fn missing(attr: &str) -> Filter {
    Filter::MissingAttribute {
        attr: attr.to_string(),
    }
}

/// The operational battery for the project/task/voice ontology.
pub fn default_checks() -> Vec<AggregateCheck> {
    vec![
        AggregateCheck::total("projects_total", "project"),
        AggregateCheck::total("tasks_total", "oper_task"),
        AggregateCheck::total("voice_sessions_total", "voice_session"),
        AggregateCheck::total("voice_messages_total", "voice_message"),
        AggregateCheck::total("voice_history_steps_total", "history_step"),
        AggregateCheck::total("voice_session_merge_logs_total", "voice_session_merge_log"),
        AggregateCheck::total("forecast_rows_total", "forecast_project_month"),
        AggregateCheck::violations(
            "orphan_tasks_without_project",
            CountQuery::all("oper_task").filter(not_related(
                "project_has_oper_task",
                "oper_task",
                "owner_project",
            )),
        ),
        AggregateCheck::violations(
            "orphan_messages_without_session",
            CountQuery::all("voice_message").filter(not_related(
                "voice_session_has_message",
                "voice_message",
                "voice_session",
            )),
        ),
        AggregateCheck::violations(
            "orphan_forecasts_without_project",
            CountQuery::all("forecast_project_month").filter(not_related(
                "project_has_forecast_month",
                "forecast_project_month",
                "owner_project",
            )),
        ),
        AggregateCheck::violations(
            "orphan_history_steps_without_session",
            CountQuery::all("history_step").filter(not_related(
                "voice_session_has_history_step",
                "history_step",
                "voice_session",
            )),
        ),
        AggregateCheck::violations(
            "orphan_session_merge_logs_without_target_session",
            CountQuery::all("voice_session_merge_log").filter(not_related(
                "voice_session_has_merge_log",
                "merge_log",
                "target_session",
            )),
        ),
        AggregateCheck::violations(
            "sessions_missing_runtime_tag",
            CountQuery::all("voice_session").filter(missing("runtime_tag")),
        ),
        AggregateCheck::violations(
            "messages_missing_runtime_tag",
            CountQuery::all("voice_message").filter(missing("runtime_tag")),
        ),
        AggregateCheck::violations(
            "merge_logs_missing_runtime_tag",
            CountQuery::all("voice_session_merge_log").filter(missing("runtime_tag")),
        ),
        AggregateCheck::violations(
            "sessions_pending_anchor_without_message",
            CountQuery::all("voice_session").filter(Filter::ReferenceNotRelated {
                attr: "pending_image_anchor_message_id".to_string(),
                target_entity: "voice_message".to_string(),
                target_attr: "voice_message_id".to_string(),
                relation: "voice_session_has_message".to_string(),
                own_role: "voice_session".to_string(),
                target_role: "voice_message".to_string(),
            }),
        ),
        AggregateCheck::violations(
            "messages_with_missing_image_anchor_parent",
            CountQuery::all("voice_message").filter(Filter::DanglingReference {
                attr: "image_anchor_message_id".to_string(),
                target_entity: "voice_message".to_string(),
                target_attr: "voice_message_id".to_string(),
            }),
        ),
        AggregateCheck::violations(
            "session_done_contract_missing_done_at",
            CountQuery::all("voice_session")
                .filter(Filter::HasValue {
                    attr: "is_active".to_string(),
                    literal: Literal::Boolean(false),
                })
                .filter(Filter::HasValue {
                    attr: "to_finalize".to_string(),
                    literal: Literal::Boolean(true),
                })
                .filter(missing("done_at")),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::graph::{RelationPattern, StoreResult, WriteStatement};
    use async_trait::async_trait;

    /// Answers counts by entity type; `broken` entity types fail.
    struct FixedCounts;

    #[async_trait]
    impl GraphStore for FixedCounts {
        async fn exists(&self, _: &str, _: &str, _: &str) -> StoreResult<bool> {
            Ok(false)
        }

        async fn exists_relation(&self, _: &RelationPattern) -> StoreResult<bool> {
            Ok(false)
        }

        async fn run_write(&self, _: &WriteStatement) -> StoreResult<()> {
            panic!("validator must not write");
        }

        async fn count(&self, query: &CountQuery) -> StoreResult<u64> {
            match query.entity.as_str() {
                "broken" => Err(StoreError::Task("connection reset".into())),
                "oper_task" => Ok(3),
                _ => Ok(0),
            }
        }
    }

    #[tokio::test]
    async fn test_levels_and_independence() {
        let checks = vec![
            AggregateCheck::total("tasks_total", "oper_task"),
            AggregateCheck::violations("broken_check", CountQuery::all("broken")),
            AggregateCheck::violations(
                "orphans",
                CountQuery::all("oper_task").filter(missing("anything")),
            ),
            AggregateCheck::violations("clean", CountQuery::all("project")),
        ];
        let reports = run_checks(&FixedCounts, &checks).await;

        let lines: Vec<String> = reports.iter().map(ToString::to_string).collect();
        assert_eq!(lines[0], "OK tasks_total=3");
        assert!(lines[1].starts_with("WARN broken_check=error:"), "{}", lines[1]);
        assert_eq!(lines[2], "WARN orphans=3");
        assert_eq!(lines[3], "OK clean=0");
    }

    #[test]
    fn test_default_battery() {
        let checks = default_checks();
        assert_eq!(checks.len(), 18);
        assert_eq!(checks.iter().filter(|c| c.warn_if.is_none()).count(), 7);

        let done = checks
            .iter()
            .find(|c| c.name == "session_done_contract_missing_done_at")
            .unwrap();
        assert_eq!(
            done.query.to_string(),
            "match $x isa voice_session, has is_active false, has to_finalize true; \
             not { $x has done_at $v; }; reduce $count = count;"
        );
    }

    const E2E_SCHEMA: &str = r#"
attribute project_id, value string;
attribute task_id, value string;
attribute name, value string;

entity project,
    owns project_id,
    owns name,
    plays project_has_oper_task:owner_project;

entity oper_task,
    owns task_id,
    owns name,
    plays project_has_oper_task:oper_task;

relation project_has_oper_task,
    relates owner_project,
    relates oper_task;
"#;

    const E2E_MAPPING: &str = r#"
collections:
  - collection: projects
    target_entity: project
    key: { attribute: project_id, from: _id }
    attributes:
      name: name
  - collection: tasks
    target_entity: oper_task
    key: { attribute: task_id, from: [id, _id] }
    attributes:
      name: name
    relations:
      - relation: project_has_oper_task
        owner_lookup: { entity: project, by: project_id, from: project }
"#;

    #[tokio::test]
    async fn test_orphans_found_after_ndjson_ingest() {
        use crate::deadletter::{read_entries, DeadLetterSink};
        use crate::ingest::testing::sqlite_store_with_schema;
        use crate::ingest::{IngestDriver, RunOptions};
        use crate::mapping::MappingConfig;
        use crate::schema::SchemaMetadata;
        use crate::source::NdjsonSource;
        use std::sync::Arc;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let exports = temp_dir.path().join("exports");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::write(
            exports.join("projects.ndjson"),
            "{\"_id\": {\"$oid\": \"65a1f0c2e4b0a1b2c3d4e5f6\"}, \"name\": \"Alpha\"}\n",
        )
        .unwrap();
        std::fs::write(
            exports.join("tasks.ndjson"),
            concat!(
                "{\"id\": \"t1\", \"name\": \"Wire\", \"project\": {\"$oid\": \"65a1f0c2e4b0a1b2c3d4e5f6\"}}\n",
                "{\"id\": \"t2\", \"name\": \"Lost\", \"project\": \"nowhere\"}\n",
                "{\"name\": \"No key\"}\n",
            ),
        )
        .unwrap();

        let schema = Arc::new(SchemaMetadata::parse(E2E_SCHEMA));
        let mapping = Arc::new(MappingConfig::parse(E2E_MAPPING).unwrap());
        let sink = Arc::new(DeadLetterSink::open(temp_dir.path().join("dl.ndjson")).unwrap());
        let store = Arc::new(sqlite_store_with_schema(&temp_dir, schema.clone()).await);
        let graph: Arc<dyn GraphStore> = store.clone();
        let driver = IngestDriver::new(
            schema,
            mapping.clone(),
            Arc::new(NdjsonSource::new(&exports)),
            sink.clone(),
        )
        .with_store(graph);

        let options = RunOptions::resolve(true, false, None, None, &mapping).unwrap();
        let stats = driver.run(&options).await.unwrap();
        assert_eq!((stats[0].scanned, stats[0].inserted), (1, 1));
        assert_eq!(
            (stats[1].scanned, stats[1].inserted, stats[1].skipped),
            (3, 2, 1)
        );
        assert_eq!((stats[1].relations_inserted, stats[1].relation_failed), (1, 1));

        let checks = vec![
            AggregateCheck::total("projects_total", "project"),
            AggregateCheck::total("tasks_total", "oper_task"),
            AggregateCheck::violations(
                "orphan_tasks_without_project",
                CountQuery::all("oper_task").filter(not_related(
                    "project_has_oper_task",
                    "oper_task",
                    "owner_project",
                )),
            ),
        ];
        let lines: Vec<String> = run_checks(&*store, &checks)
            .await
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "OK projects_total=1",
                "OK tasks_total=2",
                "WARN orphan_tasks_without_project=1",
            ]
        );

        let reasons: Vec<String> = read_entries(sink.path())
            .unwrap()
            .into_iter()
            .map(|e| e.reason)
            .collect();
        assert_eq!(reasons, vec!["relation_insert_failed", "missing_key"]);
    }
}

