//! Embedded typed graph store on SQLite.
//!
//! Entities and binary relations live in four tables (see
//! `migrations/001_graph_store.sql`). Each trait call opens its own
//! connection and transaction through [`Db::with_connection`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::migrate;
use super::transaction::{in_transaction, TxMode};
use super::Db;
use crate::error::{Result, StoreError, SyncError};
use crate::graph::{
    CountQuery, Filter, GraphStore, RelationPattern, RolePlayer, StoreResult, WriteStatement,
};
use crate::schema::{SchemaMetadata, ValueType};
use crate::value::Literal;

pub struct SqliteGraphStore {
    db: Db,
    /// When set, writes are checked against the schema before touching the store.
    schema: Option<Arc<SchemaMetadata>>,
}

impl SqliteGraphStore {
    /// Create or upgrade the store by running the migrations.
    pub async fn init_schema(
        db_path: &Path,
        migrations_dir: &Path,
        schema: Option<Arc<SchemaMetadata>>,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Db::new(db_path);
        let migrations_dir = migrations_dir.to_path_buf();
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await?;
        log::info!("Graph store initialised at {}", db_path.display());
        Ok(Self { db, schema })
    }

    /// Open a store that must already exist and be initialised.
    pub async fn open_existing(
        db_path: &Path,
        schema: Option<Arc<SchemaMetadata>>,
    ) -> Result<Self> {
        if !db_path.is_file() {
            return Err(SyncError::Config(format!(
                "Graph store not found: {}",
                db_path.display()
            )));
        }
        let db = Db::new(db_path);
        let ready = db
            .with_connection(|conn| migrate::is_initialized(conn))
            .await?;
        if !ready {
            return Err(SyncError::Config(format!(
                "Graph store {} is not initialised (run ingest with --init-schema)",
                db_path.display()
            )));
        }
        Ok(Self { db, schema })
    }

    fn check_write(&self, statement: &WriteStatement) -> StoreResult<()> {
        match &self.schema {
            Some(schema) => validate_write(schema, statement),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn exists(&self, entity_type: &str, key_attr: &str, key_value: &str) -> StoreResult<bool> {
        let player = RolePlayer::new("", entity_type, key_attr, key_value);
        self.db
            .with_connection(move |conn| {
                in_transaction(conn, TxMode::Read, |tx| {
                    Ok(!match_entities(tx, &player)?.is_empty())
                })
            })
            .await
    }

    async fn exists_relation(&self, pattern: &RelationPattern) -> StoreResult<bool> {
        let pattern = pattern.clone();
        self.db
            .with_connection(move |conn| {
                in_transaction(conn, TxMode::Read, |tx| relation_exists(tx, &pattern))
            })
            .await
    }

    async fn run_write(&self, statement: &WriteStatement) -> StoreResult<()> {
        self.check_write(statement)?;
        let statement = statement.clone();
        self.db
            .with_connection(move |conn| {
                in_transaction(conn, TxMode::Write, |tx| match &statement {
                    WriteStatement::InsertEntity {
                        entity_type,
                        key_attr,
                        key_value,
                        attributes,
                    } => insert_entity(tx, entity_type, key_attr, key_value, attributes),
                    WriteStatement::InsertRelation(pattern) => insert_relation(tx, pattern),
                })
            })
            .await
    }

    async fn count(&self, query: &CountQuery) -> StoreResult<u64> {
        let (sql, args) = compile_count(query);
        log::debug!("count: {}", query);
        self.db
            .with_connection(move |conn| {
                in_transaction(conn, TxMode::Read, |tx| {
                    let n: i64 = tx.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
                    Ok(u64::try_from(n).unwrap_or(0))
                })
            })
            .await
    }
}

fn validate_write(schema: &SchemaMetadata, statement: &WriteStatement) -> StoreResult<()> {
    match statement {
        WriteStatement::InsertEntity {
            entity_type,
            key_attr,
            attributes,
            ..
        } => {
            let key = std::iter::once((key_attr.as_str(), ValueType::String));
            let rest = attributes.iter().map(|(a, l)| (a.as_str(), l.value_type()));
            for (attr, value_type) in key.chain(rest) {
                if !schema.owns(entity_type, attr) {
                    return Err(StoreError::SchemaViolation(format!(
                        "{} does not own {}",
                        entity_type, attr
                    )));
                }
                match schema.value_type(attr) {
                    Some(declared) if *declared == value_type => {}
                    Some(declared) => {
                        return Err(StoreError::SchemaViolation(format!(
                            "{} is {}, got {}",
                            attr, declared, value_type
                        )))
                    }
                    None => {
                        return Err(StoreError::SchemaViolation(format!(
                            "attribute {} is not declared",
                            attr
                        )))
                    }
                }
            }
            Ok(())
        }
        WriteStatement::InsertRelation(pattern) => {
            let declared = schema.declared_roles(&pattern.relation);
            if declared.is_empty() {
                return Err(StoreError::SchemaViolation(format!(
                    "relation {} is not declared",
                    pattern.relation
                )));
            }
            for player in &pattern.players {
                if !declared.contains(&player.role) {
                    return Err(StoreError::SchemaViolation(format!(
                        "{} does not relate {}",
                        pattern.relation, player.role
                    )));
                }
                if !schema
                    .playable_roles(&player.entity_type, &pattern.relation)
                    .contains(&player.role)
                {
                    return Err(StoreError::SchemaViolation(format!(
                        "{} cannot play {}:{}",
                        player.entity_type, pattern.relation, player.role
                    )));
                }
            }
            Ok(())
        }
    }
}

fn match_entities(conn: &Connection, player: &RolePlayer) -> StoreResult<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.id FROM entities e
         JOIN entity_attributes a ON a.entity_id = e.id
         WHERE e.entity_type = ?1 AND a.attr = ?2 AND a.value_text = ?3
         ORDER BY e.id",
    )?;
    let ids = stmt
        .query_map(params![player.entity_type, player.attr, player.value], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn insert_entity(
    conn: &Connection,
    entity_type: &str,
    key_attr: &str,
    key_value: &str,
    attributes: &[(String, Literal)],
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO entities (entity_type, key_attr, key_value) VALUES (?1, ?2, ?3)",
        params![entity_type, key_attr, key_value],
    )?;
    let entity_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO entity_attributes (entity_id, attr, value_type, value_text)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    stmt.execute(params![entity_id, key_attr, ValueType::String.as_str(), key_value])?;
    for (attr, literal) in attributes {
        stmt.execute(params![
            entity_id,
            attr,
            literal.value_type().as_str(),
            literal.canonical_text()
        ])?;
    }
    Ok(())
}

fn relation_signature(relation: &str, mut roles: [(&str, i64); 2]) -> String {
    roles.sort();
    format!(
        "{}|{}={}|{}={}",
        relation, roles[0].0, roles[0].1, roles[1].0, roles[1].1
    )
}

fn insert_relation(conn: &Connection, pattern: &RelationPattern) -> StoreResult<()> {
    let [a, b] = &pattern.players;
    let a_ids = match_entities(conn, a)?;
    let b_ids = match_entities(conn, b)?;
    for (player, ids) in [(a, &a_ids), (b, &b_ids)] {
        if ids.is_empty() {
            return Err(StoreError::Unmatched(format!(
                "{} with {} \"{}\"",
                player.entity_type, player.attr, player.value
            )));
        }
    }

    let mut add_player = conn.prepare_cached(
        "INSERT INTO role_players (relation_id, role, entity_id) VALUES (?1, ?2, ?3)",
    )?;
    for a_id in &a_ids {
        for b_id in &b_ids {
            let signature =
                relation_signature(&pattern.relation, [(a.role.as_str(), *a_id), (b.role.as_str(), *b_id)]);
            conn.execute(
                "INSERT INTO relations (relation, signature) VALUES (?1, ?2)",
                params![pattern.relation, signature],
            )?;
            let relation_id = conn.last_insert_rowid();
            add_player.execute(params![relation_id, a.role, a_id])?;
            add_player.execute(params![relation_id, b.role, b_id])?;
        }
    }
    Ok(())
}

fn relation_exists(conn: &Connection, pattern: &RelationPattern) -> StoreResult<bool> {
    let [a, b] = &pattern.players;
    let found = conn
        .query_row(
            "SELECT 1 FROM relations r
             JOIN role_players p0 ON p0.relation_id = r.id AND p0.role = ?2
             JOIN entities e0 ON e0.id = p0.entity_id AND e0.entity_type = ?3
             JOIN entity_attributes a0 ON a0.entity_id = e0.id AND a0.attr = ?4 AND a0.value_text = ?5
             JOIN role_players p1 ON p1.relation_id = r.id AND p1.role = ?6
             JOIN entities e1 ON e1.id = p1.entity_id AND e1.entity_type = ?7
             JOIN entity_attributes a1 ON a1.entity_id = e1.id AND a1.attr = ?8 AND a1.value_text = ?9
             WHERE r.relation = ?1
             LIMIT 1",
            params![
                pattern.relation,
                a.role,
                a.entity_type,
                a.attr,
                a.value,
                b.role,
                b.entity_type,
                b.attr,
                b.value
            ],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Compile a count query to SQL with positional text arguments.
fn compile_count(query: &CountQuery) -> (String, Vec<String>) {
    let mut sql = String::from("SELECT COUNT(*) FROM entities x WHERE x.entity_type = ?");
    let mut args = vec![query.entity.clone()];

    for filter in &query.filters {
        match filter {
            Filter::HasValue { attr, literal } => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM entity_attributes a
                      WHERE a.entity_id = x.id AND a.attr = ? AND a.value_type = ? AND a.value_text = ?)",
                );
                args.push(attr.clone());
                args.push(literal.value_type().as_str().to_string());
                args.push(literal.canonical_text());
            }
            Filter::MissingAttribute { attr } => {
                sql.push_str(
                    " AND NOT EXISTS (SELECT 1 FROM entity_attributes a
                      WHERE a.entity_id = x.id AND a.attr = ?)",
                );
                args.push(attr.clone());
            }
            Filter::NotRelated {
                relation,
                own_role,
                counterpart_role,
            } => {
                sql.push_str(
                    " AND NOT EXISTS (SELECT 1 FROM role_players p
                      JOIN relations r ON r.id = p.relation_id
                      JOIN role_players q ON q.relation_id = r.id AND q.role = ?
                      WHERE p.entity_id = x.id AND p.role = ? AND r.relation = ?)",
                );
                args.push(counterpart_role.clone());
                args.push(own_role.clone());
                args.push(relation.clone());
            }
            Filter::DanglingReference {
                attr,
                target_entity,
                target_attr,
            } => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM entity_attributes ra
                      WHERE ra.entity_id = x.id AND ra.attr = ?
                      AND NOT EXISTS (SELECT 1 FROM entities t
                        JOIN entity_attributes ta ON ta.entity_id = t.id
                        WHERE t.entity_type = ? AND ta.attr = ? AND ta.value_text = ra.value_text))",
                );
                args.push(attr.clone());
                args.push(target_entity.clone());
                args.push(target_attr.clone());
            }
            Filter::ReferenceNotRelated {
                attr,
                target_entity,
                target_attr,
                relation,
                own_role,
                target_role,
            } => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM entity_attributes ra
                      WHERE ra.entity_id = x.id AND ra.attr = ?
                      AND NOT EXISTS (SELECT 1 FROM entities t
                        JOIN entity_attributes ta ON ta.entity_id = t.id
                        JOIN role_players pt ON pt.entity_id = t.id AND pt.role = ?
                        JOIN relations r ON r.id = pt.relation_id AND r.relation = ?
                        JOIN role_players px ON px.relation_id = r.id AND px.role = ? AND px.entity_id = x.id
                        WHERE t.entity_type = ? AND ta.attr = ? AND ta.value_text = ra.value_text))",
                );
                args.push(attr.clone());
                args.push(target_role.clone());
                args.push(relation.clone());
                args.push(own_role.clone());
                args.push(target_entity.clone());
                args.push(target_attr.clone());
            }
        }
    }
    (sql, args)
}
