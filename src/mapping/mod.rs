//! Declarative collection -> graph mapping, loaded from YAML.
//!
//! ```yaml
//! collections:
//!   - collection: projects
//!     target_entity: project
//!     key: { attribute: project_id, from: _id }
//!     attributes:
//!       name: name
//!       status: { from: is_active, transform: status_from_bool }
//!     relations:
//!       - relation: customer_has_project
//!         owner_lookup: { entity: customer, by: customer_id, from: customer }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_yaml_ng::Value as YamlValue;

use crate::error::{Result, SyncError};
use crate::value::{self, DocValue, Document};

pub const DEFAULT_MAX_BYTES: usize = 1_048_576;
pub const DEFAULT_SAFE_BYTES: usize = 60_000;
pub const DEFAULT_CHUNK_BYTES: usize = 60_000;

/// Separator between composite key components.
pub const KEY_SEPARATOR: &str = ":";

/// All collection mappings, in file order.
#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    entries: Vec<MappingEntry>,
}

#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub collection: String,
    pub target_entity: String,
    pub key: KeySpec,
    /// Ordered `(target attribute, source)` pairs.
    pub attributes: Vec<(String, AttributeSource)>,
    pub relations: Vec<RelationMapping>,
    pub chunking: Option<ChunkingSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    /// Destination key attribute.
    pub attribute: String,
    pub source: KeySource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// First field that yields a key component wins.
    From(Vec<String>),
    /// Every field must yield a component; joined with `:`.
    Compose(Vec<String>),
}

impl KeySpec {
    /// Derive the record key. Depends only on the declared fields, never on
    /// document field order.
    pub fn derive(&self, doc: &Document) -> Option<String> {
        match &self.source {
            KeySource::From(fields) => fields.iter().find_map(|f| key_component(doc.get(f))),
            KeySource::Compose(fields) => {
                let parts = fields
                    .iter()
                    .map(|f| key_component(doc.get(f)))
                    .collect::<Option<Vec<_>>>()?;
                Some(parts.join(KEY_SEPARATOR))
            }
        }
    }
}

/// Identifier first, then the loose string form.
pub fn key_component(value: &DocValue) -> Option<String> {
    value::normalize_id(value).or_else(|| value::to_stringish(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    StatusFromBool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSource {
    /// Candidate fields; the first present one is read.
    pub fields: Vec<String>,
    pub transform: Option<Transform>,
    pub default: Option<DocValue>,
}

impl AttributeSource {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            fields: vec![name.into()],
            transform: None,
            default: None,
        }
    }

    /// Raw value for this attribute, before type coercion.
    pub fn resolve(&self, doc: &Document) -> DocValue {
        let found = self
            .fields
            .iter()
            .map(|f| doc.get(f))
            .find(|v| !v.is_absent())
            .cloned()
            .or_else(|| self.default.clone())
            .unwrap_or(DocValue::Absent);

        match self.transform {
            Some(Transform::StatusFromBool) => {
                DocValue::String(value::status_from_bool(&found).to_string())
            }
            None => found,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationMapping {
    pub relation: String,
    pub owner_lookup: OwnerLookup,
    #[serde(default)]
    pub owner_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnerLookup {
    /// Owner entity type.
    pub entity: String,
    /// Owner key attribute in the graph.
    pub by: String,
    /// Field of the current document holding the owner id.
    pub from: String,
}

/// Oversized text handling for one collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChunkingSpec {
    pub field: String,
    pub summary_attribute: String,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_safe_bytes")]
    pub safe_bytes: usize,
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    pub chunk_entity: String,
    pub chunk_key_attribute: String,
    pub chunk_text_attribute: String,
    /// Relation linking the parent entity to each chunk.
    pub relation: String,
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_safe_bytes() -> usize {
    DEFAULT_SAFE_BYTES
}

fn default_chunk_bytes() -> usize {
    DEFAULT_CHUNK_BYTES
}

#[derive(Debug, Deserialize)]
struct RawMappingFile {
    #[serde(default)]
    collections: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    target_entity: String,
    key: Option<RawKey>,
    #[serde(default)]
    attributes: serde_yaml_ng::Mapping,
    #[serde(default)]
    relations: Vec<RelationMapping>,
    #[serde(default)]
    chunking: Option<ChunkingSpec>,
}

#[derive(Debug, Deserialize)]
struct RawKey {
    #[serde(default)]
    attribute: String,
    #[serde(default)]
    from: Option<FieldList>,
    #[serde(default)]
    compose: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldList {
    One(String),
    Many(Vec<String>),
}

impl FieldList {
    fn into_vec(self) -> Vec<String> {
        match self {
            FieldList::One(f) => vec![f],
            FieldList::Many(fs) => fs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAttributeSource {
    Field(String),
    Detailed {
        from: FieldList,
        #[serde(default)]
        transform: Option<Transform>,
        #[serde(default)]
        default: Option<YamlValue>,
    },
}

impl MappingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read mapping {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&text)?;
        log::info!(
            "Loaded mapping {} ({} collections)",
            path.display(),
            config.entries.len()
        );
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMappingFile = serde_yaml_ng::from_str(text)?;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(raw.collections.len());
        for (idx, item) in raw.collections.into_iter().enumerate() {
            let entry = convert_entry(idx, item)?;
            if !seen.insert(entry.collection.clone()) {
                return Err(SyncError::Mapping(format!(
                    "collection '{}' is mapped more than once",
                    entry.collection
                )));
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, collection: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.collection == collection)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Collection names in mapping order.
    pub fn collections(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.collection.clone()).collect()
    }
}

fn convert_entry(idx: usize, raw: RawEntry) -> Result<MappingEntry> {
    let collection = raw.collection.trim().to_string();
    if collection.is_empty() {
        return Err(SyncError::Mapping(format!(
            "entry #{} has no collection name",
            idx + 1
        )));
    }
    let invalid = |what: &str| SyncError::Mapping(format!("mapping for {}: {}", collection, what));

    if raw.target_entity.trim().is_empty() {
        return Err(invalid("missing target_entity"));
    }

    let raw_key = raw.key.ok_or_else(|| invalid("missing key"))?;
    if raw_key.attribute.trim().is_empty() {
        return Err(invalid("key has no attribute"));
    }
    let source = match (raw_key.from, raw_key.compose) {
        (Some(from), None) => KeySource::From(non_empty_fields(from.into_vec(), &invalid)?),
        (None, Some(compose)) => KeySource::Compose(non_empty_fields(compose, &invalid)?),
        (Some(_), Some(_)) => return Err(invalid("key declares both from and compose")),
        (None, None) => return Err(invalid("key needs from or compose")),
    };

    let mut attributes = Vec::with_capacity(raw.attributes.len());
    for (target, source) in raw.attributes {
        let target = match target {
            YamlValue::String(s) if !s.trim().is_empty() => s,
            other => return Err(invalid(&format!("bad attribute name {:?}", other))),
        };
        let source: RawAttributeSource = serde_yaml_ng::from_value(source)
            .map_err(|e| invalid(&format!("attribute {}: {}", target, e)))?;
        let source = match source {
            RawAttributeSource::Field(field) => {
                AttributeSource::field(non_empty_fields(vec![field], &invalid)?.remove(0))
            }
            RawAttributeSource::Detailed {
                from,
                transform,
                default,
            } => AttributeSource {
                fields: non_empty_fields(from.into_vec(), &invalid)?,
                transform,
                default: default.map(|d| yaml_scalar(&d)).transpose().map_err(|_| {
                    invalid(&format!("attribute {}: default must be a scalar", target))
                })?,
            },
        };
        attributes.push((target, source));
    }

    for rel in &raw.relations {
        let lookup = &rel.owner_lookup;
        if rel.relation.trim().is_empty()
            || lookup.entity.trim().is_empty()
            || lookup.by.trim().is_empty()
            || lookup.from.trim().is_empty()
        {
            return Err(invalid("relation entries need relation and owner_lookup {entity, by, from}"));
        }
    }

    if let Some(chunking) = &raw.chunking {
        if chunking.max_bytes == 0 || chunking.safe_bytes == 0 || chunking.chunk_bytes == 0 {
            return Err(invalid("chunking byte limits must be greater than 0"));
        }
        if chunking.safe_bytes > chunking.max_bytes {
            return Err(invalid("chunking safe_bytes must not exceed max_bytes"));
        }
    }

    Ok(MappingEntry {
        collection,
        target_entity: raw.target_entity.trim().to_string(),
        key: KeySpec {
            attribute: raw_key.attribute.trim().to_string(),
            source,
        },
        attributes,
        relations: raw.relations,
        chunking: raw.chunking,
    })
}

fn non_empty_fields(
    fields: Vec<String>,
    invalid: &dyn Fn(&str) -> SyncError,
) -> Result<Vec<String>> {
    if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
        return Err(invalid("field lists must be non-empty names"));
    }
    Ok(fields)
}

fn yaml_scalar(value: &YamlValue) -> std::result::Result<DocValue, ()> {
    match value {
        YamlValue::String(s) => Ok(DocValue::String(s.clone())),
        YamlValue::Bool(b) => Ok(DocValue::Boolean(*b)),
        YamlValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(DocValue::Integer(i)),
            None => n.as_f64().map(DocValue::Double).ok_or(()),
        },
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
collections:
  - collection: projects
    target_entity: project
    key: { attribute: project_id, from: _id }
    attributes:
      project_id: _id
      name: name
      status: { from: is_active, transform: status_from_bool }
      priority: { from: [priority, legacy_priority], default: 3 }
    relations:
      - relation: customer_has_project
        owner_lookup: { entity: customer, by: customer_id, from: customer }
        owner_role: customer
  - collection: forecasts
    target_entity: forecast_row
    key: { attribute: forecast_id, compose: [project_id, month] }
  - collection: messages
    target_entity: voice_message
    key: { attribute: voice_message_id, from: _id }
    chunking:
      field: transcription_text
      summary_attribute: summary
      chunk_entity: transcript_chunk
      chunk_key_attribute: transcript_chunk_id
      chunk_text_attribute: summary
      relation: voice_message_chunked_as_transcript_chunk
"#;

    fn s(text: &str) -> DocValue {
        DocValue::String(text.to_string())
    }

    #[test]
    fn test_parse_sample_mapping() {
        let config = MappingConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.collections(), vec!["projects", "forecasts", "messages"]);

        let projects = config.get("projects").unwrap();
        assert_eq!(projects.target_entity, "project");
        assert_eq!(projects.key.source, KeySource::From(vec!["_id".to_string()]));
        let names: Vec<&str> = projects.attributes.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(names, vec!["project_id", "name", "status", "priority"]);
        assert_eq!(projects.relations[0].owner_lookup.by, "customer_id");
        assert_eq!(projects.relations[0].owner_role.as_deref(), Some("customer"));

        let messages = config.get("messages").unwrap();
        let chunking = messages.chunking.as_ref().unwrap();
        assert_eq!(chunking.max_bytes, DEFAULT_MAX_BYTES);
        assert_eq!(chunking.safe_bytes, DEFAULT_SAFE_BYTES);
        assert_eq!(chunking.chunk_bytes, DEFAULT_CHUNK_BYTES);
        assert!(config.get("unknown").is_none());
    }

    #[test]
    fn test_composite_key_ignores_field_order() {
        let config = MappingConfig::parse(SAMPLE).unwrap();
        let key = &config.get("forecasts").unwrap().key;

        let a = Document::new()
            .with("project_id", s("p1"))
            .with("month", s("2026-01"));
        let b = Document::new()
            .with("zzz", DocValue::Integer(1))
            .with("month", s("2026-01"))
            .with("project_id", s("p1"));
        assert_eq!(key.derive(&a).as_deref(), Some("p1:2026-01"));
        assert_eq!(key.derive(&b).as_deref(), Some("p1:2026-01"));

        let partial = Document::new().with("project_id", s("p1"));
        assert_eq!(key.derive(&partial), None);
    }

    #[test]
    fn test_from_key_falls_back_across_fields() {
        let key = KeySpec {
            attribute: "operation_id".into(),
            source: KeySource::From(vec!["operation_id".into(), "_id".into()]),
        };
        let doc = Document::new().with("_id", DocValue::ObjectId("abc".into()));
        assert_eq!(key.derive(&doc).as_deref(), Some("abc"));
        let doc = doc.with("operation_id", s("op-1"));
        assert_eq!(key.derive(&doc).as_deref(), Some("op-1"));
    }

    #[test]
    fn test_attribute_source_resolution() {
        let config = MappingConfig::parse(SAMPLE).unwrap();
        let attrs = &config.get("projects").unwrap().attributes;
        let status = &attrs[2].1;
        let priority = &attrs[3].1;

        let doc = Document::new()
            .with("is_active", DocValue::Boolean(false))
            .with("legacy_priority", DocValue::Integer(1));
        assert_eq!(status.resolve(&doc), s("inactive"));
        assert_eq!(priority.resolve(&doc), DocValue::Integer(1));

        let empty = Document::new();
        assert_eq!(status.resolve(&empty), s("unknown"));
        assert_eq!(priority.resolve(&empty), DocValue::Integer(3));
    }

    #[test]
    fn test_malformed_entries_rejected() {
        let cases = [
            "collections:\n  - target_entity: x\n    key: { attribute: a, from: _id }\n",
            "collections:\n  - collection: c\n    key: { attribute: a, from: _id }\n",
            "collections:\n  - collection: c\n    target_entity: x\n",
            "collections:\n  - collection: c\n    target_entity: x\n    key: { attribute: a }\n",
            "collections:\n  - collection: c\n    target_entity: x\n    key: { attribute: a, from: _id, compose: [a, b] }\n",
            "collections:\n  - collection: c\n    target_entity: x\n    key: { attribute: a, compose: [] }\n",
            "collections:\n  - collection: c\n    target_entity: x\n    key: { attribute: a, from: _id }\n  - collection: c\n    target_entity: y\n    key: { attribute: a, from: _id }\n",
        ];
        for case in cases {
            let err = MappingConfig::parse(case).unwrap_err();
            assert!(matches!(err, SyncError::Mapping(_)), "case {:?} gave {:?}", case, err);
        }
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(MappingConfig::parse("collections: [").is_err());
    }

    #[test]
    fn test_empty_mapping_is_valid() {
        let config = MappingConfig::parse("collections: []").unwrap();
        assert!(config.entries().is_empty());
    }

    #[test]
    fn test_bundled_ontology_is_consistent() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("ontology");
        let schema = crate::schema::SchemaMetadata::load(&root.join("schema.tql")).unwrap();
        let mapping = MappingConfig::load(&root.join("mapping.yaml")).unwrap();

        assert_eq!(mapping.entries().len(), 6);
        for entry in mapping.entries() {
            assert!(schema.knows_entity(&entry.target_entity), "{}", entry.target_entity);
            assert!(schema.owns(&entry.target_entity, &entry.key.attribute));
            for rel in &entry.relations {
                assert_eq!(schema.declared_roles(&rel.relation).len(), 2, "{}", rel.relation);
            }
        }
        let messages = mapping.get("automation_voice_bot_messages").unwrap();
        assert_eq!(messages.chunking.as_ref().unwrap().max_bytes, DEFAULT_MAX_BYTES);
    }
}

