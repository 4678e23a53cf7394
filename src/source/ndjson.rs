use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use serde_json::Value as JsonValue;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;

use super::{DocumentSource, DocumentStream};
use crate::error::{Result, SyncError};
use crate::value::Document;

/// Reads `<dir>/<collection>.ndjson` exports (one extended-JSON document per line).
#[derive(Debug, Clone)]
pub struct NdjsonSource {
    dir: PathBuf,
}

impl NdjsonSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || collection.contains(['/', '\\'])
            || collection.starts_with('.')
        {
            return Err(SyncError::InvalidInput(format!(
                "Invalid collection name: {:?}",
                collection
            )));
        }
        Ok(self.dir.join(format!("{}.ndjson", collection)))
    }
}

fn parse_line(text: &str) -> std::result::Result<Document, String> {
    let value: JsonValue = serde_json::from_str(text).map_err(|e| e.to_string())?;
    Document::from_json(value).ok_or_else(|| "expected a JSON object".to_string())
}

#[async_trait]
impl DocumentSource for NdjsonSource {
    async fn documents(&self, collection: &str, limit: Option<usize>) -> Result<DocumentStream> {
        let path = self.path_for(collection)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("No export for {} at {}; treating as empty", collection, path.display());
                return Ok(stream::empty().boxed());
            }
            Err(e) => return Err(e.into()),
        };

        let display = path.display().to_string();
        let docs = LinesStream::new(BufReader::new(file).lines())
            .enumerate()
            .filter_map(move |(idx, line)| {
                let item = match line {
                    Ok(text) if text.trim().is_empty() => None,
                    Ok(text) => Some(parse_line(&text)),
                    Err(e) => Some(Err(e.to_string())),
                }
                .map(|parsed| {
                    parsed.map_err(|e| SyncError::Source(format!("{}:{}: {}", display, idx + 1, e)))
                });
                future::ready(item)
            });

        Ok(match limit {
            Some(n) => docs.take(n).boxed(),
            None => docs.boxed(),
        })
    }
}
