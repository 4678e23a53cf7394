//! Generic document-to-graph path shared by every handler.

use serde_json::{json, Value as JsonValue};

use super::roles::resolve_roles;
use super::stats::CollectionStats;
use super::upsert::{UpsertOutcome, Upserter};
use crate::deadletter::{DeadLetter, REASON_MISSING_KEY, REASON_RELATION_ROLES_UNRESOLVED};
use crate::error::Result;
use crate::graph::{RelationPattern, RolePlayer, WriteStatement};
use crate::mapping::{key_component, MappingEntry};
use crate::schema::SchemaMetadata;
use crate::value::{coerce, normalize_id, DocValue, Document, Literal};

/// Read-only state every handler call needs.
#[derive(Clone, Copy)]
pub struct IngestContext<'a> {
    pub schema: &'a SchemaMetadata,
    pub upserter: Upserter<'a>,
}

impl<'a> IngestContext<'a> {
    pub fn new(schema: &'a SchemaMetadata, upserter: Upserter<'a>) -> Self {
        Self { schema, upserter }
    }
}

/// Derive the record key, or count the record as skipped and dead-letter it.
pub fn derive_key(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    doc: &Document,
    stats: &mut CollectionStats,
) -> Result<Option<String>> {
    if let Some(key) = entry.key.derive(doc) {
        return Ok(Some(key));
    }
    stats.skipped += 1;
    log::debug!("[{}] record without key skipped", entry.collection);
    let letter = DeadLetter::new(
        &entry.collection,
        normalize_id(doc.get("_id")),
        REASON_MISSING_KEY,
        doc.to_json(),
    );
    ctx.upserter.sink().write(letter)?;
    Ok(None)
}

/// Coerce mapped attributes for the record's entity.
///
/// Attributes the schema does not let the entity own, attributes of unknown
/// type and values that coerce to nothing are left out. `overrides` replace
/// mapped attributes of the same name and go through the same filter.
pub fn entity_attributes(
    schema: &SchemaMetadata,
    entry: &MappingEntry,
    doc: &Document,
    overrides: &[(String, DocValue)],
) -> Vec<(String, Literal)> {
    let mapped = entry
        .attributes
        .iter()
        .filter(|(attr, _)| !overrides.iter().any(|(name, _)| name == attr))
        .map(|(attr, source)| (attr.as_str(), source.resolve(doc)));
    let extra = overrides
        .iter()
        .map(|(attr, value)| (attr.as_str(), value.clone()));

    mapped
        .chain(extra)
        .filter(|(attr, _)| *attr != entry.key.attribute)
        .filter(|(attr, _)| schema.owns(&entry.target_entity, attr))
        .filter_map(|(attr, raw)| {
            let value_type = schema.value_type(attr)?;
            coerce(&raw, value_type).map(|literal| (attr.to_string(), literal))
        })
        .collect()
}

/// Upsert the record's own entity.
pub async fn upsert_record_entity(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    key: &str,
    doc: &Document,
    overrides: &[(String, DocValue)],
    stats: &mut CollectionStats,
) -> Result<UpsertOutcome> {
    let attributes = entity_attributes(ctx.schema, entry, doc, overrides);
    let statement = WriteStatement::entity(&entry.target_entity, &entry.key.attribute, key, attributes);
    ctx.upserter
        .upsert_entity(stats, &entry.collection, key, &statement, &doc.to_json())
        .await
}

/// Link the record to the owners its mapping names. Absent owner
/// references are skipped silently.
pub async fn upsert_record_relations(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    key: &str,
    doc: &Document,
    stats: &mut CollectionStats,
) -> Result<()> {
    for mapping in &entry.relations {
        let owner = &mapping.owner_lookup;
        let Some(owner_value) = key_component(doc.get(&owner.from)) else {
            continue;
        };

        let roles = resolve_roles(
            ctx.schema,
            &mapping.relation,
            &entry.target_entity,
            &owner.entity,
            mapping.owner_role.as_deref(),
        );
        let Some((source_role, owner_role)) = roles else {
            roles_unresolved(
                ctx,
                entry,
                key,
                &mapping.relation,
                &owner.entity,
                mapping.owner_role.as_deref(),
                stats,
            )?;
            continue;
        };

        let pattern = RelationPattern {
            relation: mapping.relation.clone(),
            players: [
                RolePlayer::new(source_role, &entry.target_entity, &entry.key.attribute, key),
                RolePlayer::new(owner_role, &owner.entity, &owner.by, &owner_value),
            ],
        };
        let payload: JsonValue = json!({
            "source_id": key,
            "relation": mapping.relation,
            "owner_entity": owner.entity,
            "owner_by": owner.by,
            "owner_value": owner_value,
        });
        ctx.upserter
            .upsert_relation(stats, &entry.collection, key, pattern, &payload)
            .await?;
    }
    Ok(())
}

/// Count and dead-letter a relation whose roles cannot be decided.
pub(crate) fn roles_unresolved(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    key: &str,
    relation: &str,
    owner_entity: &str,
    owner_role_hint: Option<&str>,
    stats: &mut CollectionStats,
) -> Result<()> {
    stats.relation_failed += 1;
    log::warn!(
        "[{}] cannot resolve roles of {} between {} and {}",
        entry.collection,
        relation,
        entry.target_entity,
        owner_entity
    );
    let letter = DeadLetter::new(
        &entry.collection,
        Some(key.to_string()),
        REASON_RELATION_ROLES_UNRESOLVED,
        json!({
            "relation": relation,
            "source_entity": entry.target_entity,
            "owner_entity": owner_entity,
            "owner_role_hint": owner_role_hint,
        }),
    );
    ctx.upserter.sink().write(letter)
}

/// Generic path: key, entity, relations. Returns this record's delta.
///
/// Relations are attempted whatever the entity outcome; a failed entity
/// write leaves its relations to fail on their own match.
pub async fn ingest_document(
    ctx: &IngestContext<'_>,
    entry: &MappingEntry,
    doc: &Document,
) -> Result<CollectionStats> {
    let mut delta = CollectionStats::new(&entry.collection);
    let Some(key) = derive_key(ctx, entry, doc, &mut delta)? else {
        return Ok(delta);
    };
    upsert_record_entity(ctx, entry, &key, doc, &[], &mut delta).await?;
    upsert_record_relations(ctx, entry, &key, doc, &mut delta).await?;
    Ok(delta)
}
