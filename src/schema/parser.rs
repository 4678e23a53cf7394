//! Line-oriented reader for the schema language (regex-based).

use regex::Regex;

use super::{SchemaMetadata, ValueType};

pub(super) fn parse_schema(text: &str) -> SchemaMetadata {
    let mut schema = SchemaMetadata::default();

    let attribute_regex = Regex::new(r"(?m)^\s*attribute\s+([A-Za-z0-9_\-]+),\s*value\s+([A-Za-z0-9_]+)\s*;")
        .expect("Invalid regex pattern");
    let plays_regex =
        Regex::new(r"^plays\s+([A-Za-z0-9_\-]+):([A-Za-z0-9_\-]+)").expect("Invalid regex pattern");

    for cap in attribute_regex.captures_iter(text) {
        schema
            .attribute_value_types
            .insert(cap[1].to_string(), ValueType::from_name(&cap[2]));
    }

    let mut current_entity: Option<String> = None;
    let mut current_relation: Option<String> = None;
    let mut current_roles: Vec<String> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let closes = line.ends_with(';');
        let mut clauses = line.split(',').map(str::trim).filter(|c| !c.is_empty());

        if let Some(rest) = line.strip_prefix("entity ") {
            current_entity = first_word(rest);
            current_relation = None;
            clauses.next();
        } else if let Some(rest) = line.strip_prefix("relation ") {
            current_relation = first_word(rest);
            current_entity = None;
            current_roles.clear();
            clauses.next();
        }

        if let Some(entity) = current_entity.clone() {
            for clause in clauses {
                entity_clause(&mut schema, &plays_regex, &entity, clause);
            }
            if closes {
                current_entity = None;
            }
        } else if let Some(relation) = current_relation.clone() {
            for clause in clauses {
                if let Some(role) = clause.strip_prefix("relates ").and_then(first_word) {
                    current_roles.push(role);
                }
            }
            if closes {
                if !current_roles.is_empty() {
                    schema
                        .relation_roles
                        .insert(relation, std::mem::take(&mut current_roles));
                }
                current_relation = None;
            }
        }
    }

    schema
}

fn entity_clause(schema: &mut SchemaMetadata, plays_regex: &Regex, entity: &str, clause: &str) {
    if let Some(cap) = plays_regex.captures(clause) {
        schema
            .entity_relation_roles
            .entry((entity.to_string(), cap[1].to_string()))
            .or_default()
            .insert(cap[2].to_string());
    } else if let Some(attr) = clause.strip_prefix("owns ").and_then(first_word) {
        schema
            .entity_owned_attrs
            .entry(entity.to_string())
            .or_default()
            .insert(attr);
    }
}

/// First whitespace-delimited token with trailing `,`/`;` stripped.
fn first_word(rest: &str) -> Option<String> {
    rest.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches([',', ';']).to_string())
        .filter(|word| !word.is_empty())
}
