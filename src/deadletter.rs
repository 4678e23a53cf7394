//! Append-only NDJSON log of records and writes that could not be processed.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Result, SyncError};

pub const REASON_MISSING_KEY: &str = "missing_key";
pub const REASON_INSERT_FAILED: &str = "insert_failed";
pub const REASON_RELATION_INSERT_FAILED: &str = "relation_insert_failed";
pub const REASON_RELATION_ROLES_UNRESOLVED: &str = "relation_roles_unresolved";
pub const REASON_TRANSCRIPT_CAPPED: &str = "transcript_capped";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A failure or audit event produced while handling one record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub collection: String,
    pub source_id: Option<String>,
    pub reason: String,
    pub payload: JsonValue,
    pub error: Option<String>,
    pub query: Option<String>,
}

impl DeadLetter {
    pub fn new(
        collection: impl Into<String>,
        source_id: Option<String>,
        reason: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            collection: collection.into(),
            source_id,
            reason: reason.into(),
            payload,
            error: None,
            query: None,
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_query(mut self, query: impl ToString) -> Self {
        self.query = Some(query.to_string());
        self
    }
}

/// One persisted line of the dead-letter log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub timestamp: String,
    pub run_id: String,
    pub collection: String,
    pub source_id: Option<String>,
    pub reason: String,
    pub payload: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Serialized appender shared by every handler of a run.
pub struct DeadLetterSink {
    path: PathBuf,
    run_id: Uuid,
    file: Mutex<File>,
}

impl DeadLetterSink {
    /// Open (or create) the log for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let run_id = Uuid::new_v4();
        log::debug!("Dead-letter log {} (run {})", path.display(), run_id);
        Ok(Self {
            path,
            run_id,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stamp and append one entry, flushing before the lock is released.
    pub fn write(&self, letter: DeadLetter) -> Result<()> {
        let entry = DeadLetterEntry {
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            run_id: self.run_id.to_string(),
            collection: letter.collection,
            source_id: letter.source_id,
            reason: letter.reason,
            payload: letter.payload,
            error: letter.error,
            query: letter.query,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| SyncError::InvalidInput("dead-letter lock poisoned".to_string()))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Read every entry of a dead-letter log. Blank lines are skipped.
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<DeadLetterEntry>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| {
            SyncError::Parse(format!("{}:{}: {}", path.display(), idx + 1, e))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Entry counts per `(collection, reason)`, optionally limited to one run.
pub fn summarize<'a>(
    entries: impl IntoIterator<Item = &'a DeadLetterEntry>,
    run_id: Option<&str>,
) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        if run_id.is_some_and(|id| id != entry.run_id) {
            continue;
        }
        *counts
            .entry((entry.collection.clone(), entry.reason.clone()))
            .or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_appends_stamped_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("deadletter.ndjson");
        let sink = DeadLetterSink::open(&path).unwrap();

        sink.write(DeadLetter::new(
            "projects",
            None,
            REASON_MISSING_KEY,
            json!({"name": "x"}),
        ))
        .unwrap();
        sink.write(
            DeadLetter::new("projects", Some("p1".into()), REASON_INSERT_FAILED, json!({"_id": "p1"}))
                .with_error("boom")
                .with_query("insert $e isa project;"),
        )
        .unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reason, "missing_key");
        assert_eq!(entries[0].source_id, None);
        assert_eq!(entries[0].error, None);
        assert_eq!(entries[1].error.as_deref(), Some("boom"));
        assert_eq!(entries[1].query.as_deref(), Some("insert $e isa project;"));
        assert_eq!(entries[0].run_id, sink.run_id().to_string());
        assert_eq!(entries[0].run_id, entries[1].run_id);
        assert!(entries[0].timestamp.ends_with('Z'));
        assert_eq!(entries[0].timestamp.len(), "2026-01-05T10:00:00Z".len());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dl.ndjson");
        let sink = DeadLetterSink::open(&path).unwrap();
        sink.write(DeadLetter::new("c", None, "r", json!(null))).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"source_id\":null"));
        assert!(!raw.contains("\"error\""));
        assert!(!raw.contains("\"query\""));
    }

    #[test]
    fn test_reopen_keeps_existing_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dl.ndjson");
        {
            let sink = DeadLetterSink::open(&path).unwrap();
            sink.write(DeadLetter::new("a", None, "r", json!({}))).unwrap();
        }
        let sink = DeadLetterSink::open(&path).unwrap();
        sink.write(DeadLetter::new("b", None, "r", json!({}))).unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].run_id, entries[1].run_id);
    }

    #[test]
    fn test_read_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dl.ndjson");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(read_entries(&path), Err(SyncError::Parse(_))));
    }

    #[test]
    fn test_summarize_groups_and_filters_by_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dl.ndjson");
        {
            let old = DeadLetterSink::open(&path).unwrap();
            old.write(DeadLetter::new("tasks", None, REASON_MISSING_KEY, json!({}))).unwrap();
        }
        let sink = DeadLetterSink::open(&path).unwrap();
        for _ in 0..2 {
            sink.write(DeadLetter::new("tasks", None, REASON_MISSING_KEY, json!({}))).unwrap();
        }
        sink.write(DeadLetter::new("projects", None, REASON_INSERT_FAILED, json!({}))).unwrap();

        let entries = read_entries(&path).unwrap();
        let all = summarize(&entries, None);
        assert_eq!(all[&("tasks".to_string(), "missing_key".to_string())], 3);

        let run = sink.run_id().to_string();
        let current = summarize(&entries, Some(&run));
        assert_eq!(
            current.into_iter().collect::<Vec<_>>(),
            vec![
                (("projects".to_string(), "insert_failed".to_string()), 1),
                (("tasks".to_string(), "missing_key".to_string()), 2),
            ]
        );
    }
}
