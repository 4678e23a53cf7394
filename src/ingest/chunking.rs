//! Records carrying a text field too large for a single attribute.
//!
//! The text is capped, the parent keeps a short summary, and the capped text
//! is stored as numbered chunk entities linked back to the parent.

use serde_json::{json, Map, Value as JsonValue};

use super::handler::{derive_key, roles_unresolved, upsert_record_entity, upsert_record_relations, IngestContext};
use super::roles::resolve_roles;
use super::stats::CollectionStats;
use crate::deadletter::{DeadLetter, REASON_TRANSCRIPT_CAPPED};
use crate::error::Result;
use crate::graph::{RelationPattern, RolePlayer, WriteStatement};
use crate::mapping::{ChunkingSpec, MappingEntry};
use crate::value::{
    as_string, split_by_byte_limit, truncate_to_byte_limit, utf8_byte_length, DocValue, Document,
    Literal,
};

/// Chunk keys look like `<parent>:chunk:00001`.
pub fn chunk_key(parent_key: &str, index: usize) -> String {
    format!("{}:chunk:{:05}", parent_key, index)
}

pub async fn ingest_chunked_document(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    spec: &ChunkingSpec,
    doc: &Document,
) -> Result<CollectionStats> {
    let mut delta = CollectionStats::new(&entry.collection);
    let Some(key) = derive_key(ctx, entry, doc, &mut delta)? else {
        return Ok(delta);
    };

    let raw = as_string(doc.get(&spec.field));
    let capped = raw
        .as_deref()
        .map(|text| truncate_to_byte_limit(text, spec.max_bytes));

    let overrides: Vec<(String, DocValue)> = capped
        .map(|text| {
            let summary = truncate_to_byte_limit(text, spec.safe_bytes);
            vec![(spec.summary_attribute.clone(), DocValue::String(summary.to_string()))]
        })
        .unwrap_or_default();
    upsert_record_entity(ctx, entry, &key, doc, &overrides, &mut delta).await?;

    if let (Some(raw), Some(capped)) = (raw.as_deref(), capped) {
        if capped.len() < raw.len() {
            log::info!(
                "[{}] {} capped {} -> {} bytes",
                entry.collection,
                key,
                utf8_byte_length(raw),
                utf8_byte_length(capped)
            );
            let letter = DeadLetter::new(
                &entry.collection,
                Some(key.clone()),
                REASON_TRANSCRIPT_CAPPED,
                json!({
                    "original_bytes": utf8_byte_length(raw),
                    "capped_bytes": utf8_byte_length(capped),
                }),
            );
            ctx.upserter.sink().write(letter)?;
        }

        if utf8_byte_length(capped) > spec.safe_bytes {
            upsert_chunks(ctx, entry, spec, &key, capped, &mut delta).await?;
        }
    }

    upsert_record_relations(ctx, entry, &key, doc, &mut delta).await?;
    Ok(delta)
}

async fn upsert_chunks(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    spec: &ChunkingSpec,
    key: &str,
    text: &str,
    delta: &mut CollectionStats,
) -> Result<()> {
    let roles = resolve_roles(
        ctx.schema,
        &spec.relation,
        &entry.target_entity,
        &spec.chunk_entity,
        None,
    );
    let chunks = split_by_byte_limit(text, spec.chunk_bytes);
    log::debug!("[{}] {} split into {} chunks", entry.collection, key, chunks.len());

    for (offset, chunk) in chunks.into_iter().enumerate() {
        let index = offset + 1;
        let chunk_id = chunk_key(key, index);
        let mut payload = Map::new();
        payload.insert(entry.key.attribute.clone(), json!(key));
        payload.insert(spec.chunk_key_attribute.clone(), json!(chunk_id));
        payload.insert("chunk_index".to_string(), json!(index));
        let payload = JsonValue::Object(payload);

        let statement = WriteStatement::entity(
            &spec.chunk_entity,
            &spec.chunk_key_attribute,
            &chunk_id,
            vec![(spec.chunk_text_attribute.clone(), Literal::String(chunk))],
        );
        ctx.upserter
            .upsert_auxiliary_entity(delta, &entry.collection, key, &statement, &payload)
            .await?;

        let Some((parent_role, chunk_role)) = roles.clone() else {
            roles_unresolved(ctx, entry, key, &spec.relation, &spec.chunk_entity, None, delta)?;
            continue;
        };
        let pattern = RelationPattern {
            relation: spec.relation.clone(),
            players: [
                RolePlayer::new(parent_role, &entry.target_entity, &entry.key.attribute, key),
                RolePlayer::new(chunk_role, &spec.chunk_entity, &spec.chunk_key_attribute, &chunk_id),
            ],
        };
        ctx.upserter
            .upsert_relation(delta, &entry.collection, key, pattern, &payload)
            .await?;
    }
    Ok(())
}
