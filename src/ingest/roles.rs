//! Role resolution: ordered rules pick the two role names of a relation link.

use std::collections::BTreeSet;

use crate::schema::SchemaMetadata;

fn singleton(roles: &BTreeSet<String>) -> Option<&str> {
    match roles.len() {
        1 => roles.iter().next().map(String::as_str),
        _ => None,
    }
}

/// The declared role that is not `taken`, for two-role relations.
fn other_role<'s>(declared: &'s [String], taken: &str) -> Option<&'s str> {
    if declared.len() != 2 {
        return None;
    }
    declared.iter().map(String::as_str).find(|role| *role != taken)
}

/// Pick `(source_role, owner_role)` for a binary relation.
///
/// Rules, first match wins:
/// 1. both sides play exactly one role in the relation;
/// 2. the source side plays one role, the owner takes the other declared role;
/// 3. the owner side plays one role, the source takes the other declared role;
/// 4. the hint names one of the two declared roles and the owner takes it;
/// 5. two declared roles are assigned in declaration order, source first.
///
/// `None` when nothing applies.
pub fn resolve_roles(
    schema: &SchemaMetadata,
    relation: &str,
    source_entity: &str,
    owner_entity: &str,
    owner_role_hint: Option<&str>,
) -> Option<(String, String)> {
    let declared = schema.declared_roles(relation);
    let source_roles = schema.playable_roles(source_entity, relation);
    let owner_roles = schema.playable_roles(owner_entity, relation);
    let source_single = singleton(&source_roles);
    let owner_single = singleton(&owner_roles);

    if let (Some(source), Some(owner)) = (source_single, owner_single) {
        return Some((source.to_string(), owner.to_string()));
    }
    if let Some(source) = source_single {
        if let Some(owner) = other_role(declared, source) {
            return Some((source.to_string(), owner.to_string()));
        }
    }
    if let Some(owner) = owner_single {
        if let Some(source) = other_role(declared, owner) {
            return Some((source.to_string(), owner.to_string()));
        }
    }
    if let Some(hint) = owner_role_hint {
        if declared.iter().any(|role| role == hint) {
            if let Some(source) = other_role(declared, hint) {
                return Some((source.to_string(), hint.to_string()));
            }
        }
    }
    match declared {
        [first, second] => Some((first.clone(), second.clone())),
        _ => None,
    }
}
