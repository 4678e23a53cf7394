use std::fmt;

use crate::value::Literal;

/// Count of entities of one type satisfying every filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub entity: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Entity has `attr` equal to `literal`.
    HasValue { attr: String, literal: Literal },
    /// Entity has no value for `attr`.
    MissingAttribute { attr: String },
    /// Entity plays `own_role` in no `relation` instance.
    NotRelated {
        relation: String,
        own_role: String,
        counterpart_role: String,
    },
    /// Entity holds `attr` but no `target_entity` has `target_attr` equal to it.
    DanglingReference {
        attr: String,
        target_entity: String,
        target_attr: String,
    },
    /// Entity holds `attr`, and no `target_entity` with that `target_attr`
    /// is linked to it through `relation`.
    ReferenceNotRelated {
        attr: String,
        target_entity: String,
        target_attr: String,
        relation: String,
        own_role: String,
        target_role: String,
    },
}

impl CountQuery {
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Destination query text, for logs and reports.
impl fmt::Display for CountQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match $x isa {}", self.entity)?;
        // value filters attach to the match clause
        for filter in &self.filters {
            match filter {
                Filter::HasValue { attr, literal } => write!(f, ", has {} {}", attr, literal)?,
                Filter::DanglingReference { attr, .. } | Filter::ReferenceNotRelated { attr, .. } => {
                    write!(f, ", has {} $ref", attr)?
                }
                _ => {}
            }
        }
        f.write_str(";")?;
        for filter in &self.filters {
            match filter {
                Filter::HasValue { .. } => {}
                Filter::MissingAttribute { attr } => write!(f, " not {{ $x has {} $v; }};", attr)?,
                Filter::NotRelated {
                    relation,
                    own_role,
                    counterpart_role,
                } => write!(
                    f,
                    " not {{ ({}: $y, {}: $x) isa {}; }};",
                    counterpart_role, own_role, relation
                )?,
                Filter::DanglingReference {
                    target_entity,
                    target_attr,
                    ..
                } => write!(
                    f,
                    " not {{ $t isa {}, has {} $ref; }};",
                    target_entity, target_attr
                )?,
                Filter::ReferenceNotRelated {
                    target_entity,
                    target_attr,
                    relation,
                    own_role,
                    target_role,
                    ..
                } => write!(
                    f,
                    " not {{ $t isa {}, has {} $ref; ({}: $x, {}: $t) isa {}; }};",
                    target_entity, target_attr, own_role, target_role, relation
                )?,
            }
        }
        f.write_str(" reduce $count = count;")
    }
}
