use std::fmt;

use crate::value::{escape_literal, Literal};

/// One side of a binary relation, matched by an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct RolePlayer {
    pub role: String,
    pub entity_type: String,
    /// Attribute the player is matched by (usually its key attribute).
    pub attr: String,
    pub value: String,
}

impl RolePlayer {
    pub fn new(
        role: impl Into<String>,
        entity_type: impl Into<String>,
        attr: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            entity_type: entity_type.into(),
            attr: attr.into(),
            value: value.into(),
        }
    }
}

/// A relation instance between two matched entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPattern {
    pub relation: String,
    pub players: [RolePlayer; 2],
}

const PLAYER_VARS: [&str; 2] = ["$e", "$o"];

impl RelationPattern {
    fn fmt_match(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("match ")?;
        for (var, player) in PLAYER_VARS.iter().zip(&self.players) {
            write!(
                f,
                "{} isa {}, has {} \"{}\"; ",
                var,
                player.entity_type,
                player.attr,
                escape_literal(&player.value)
            )?;
        }
        Ok(())
    }

    fn fmt_tuple(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = &self.players;
        write!(
            f,
            "({}: {}, {}: {}) isa {}",
            a.role, PLAYER_VARS[0], b.role, PLAYER_VARS[1], self.relation
        )
    }
}

/// Existence-check rendering.
impl fmt::Display for RelationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_match(f)?;
        self.fmt_tuple(f)?;
        f.write_str("; limit 1;")
    }
}

/// A single write, executed in its own transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteStatement {
    InsertEntity {
        entity_type: String,
        key_attr: String,
        key_value: String,
        /// Coerced attributes other than the key, in mapping order.
        attributes: Vec<(String, Literal)>,
    },
    InsertRelation(RelationPattern),
}

impl WriteStatement {
    pub fn entity(
        entity_type: impl Into<String>,
        key_attr: impl Into<String>,
        key_value: impl Into<String>,
        attributes: Vec<(String, Literal)>,
    ) -> Self {
        WriteStatement::InsertEntity {
            entity_type: entity_type.into(),
            key_attr: key_attr.into(),
            key_value: key_value.into(),
            attributes,
        }
    }
}

/// Destination query text; this is what lands in dead-letter `query` fields.
impl fmt::Display for WriteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStatement::InsertEntity {
                entity_type,
                key_attr,
                key_value,
                attributes,
            } => {
                write!(
                    f,
                    "insert $e isa {}, has {} \"{}\"",
                    entity_type,
                    key_attr,
                    escape_literal(key_value)
                )?;
                for (attr, literal) in attributes {
                    write!(f, ", has {} {}", attr, literal)?;
                }
                f.write_str(";")
            }
            WriteStatement::InsertRelation(pattern) => {
                pattern.fmt_match(f)?;
                f.write_str("insert ")?;
                pattern.fmt_tuple(f)?;
                f.write_str(";")
            }
        }
    }
}
