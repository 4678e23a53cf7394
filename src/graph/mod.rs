//! Destination graph store contract.
//!
//! Every call is independent: implementations open a fresh transaction per
//! call, commit on success, roll back on failure and always release it.

mod query;
mod statement;

pub use query::{CountQuery, Filter};
pub use statement::{RelationPattern, RolePlayer, WriteStatement};

use async_trait::async_trait;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Is there an entity of `entity_type` whose `key_attr` equals `key_value`?
    async fn exists(&self, entity_type: &str, key_attr: &str, key_value: &str) -> StoreResult<bool>;

    /// Does the relation instance already exist between the matched players?
    async fn exists_relation(&self, pattern: &RelationPattern) -> StoreResult<bool>;

    /// Execute one write in its own transaction.
    async fn run_write(&self, statement: &WriteStatement) -> StoreResult<()>;

    /// Read-only aggregate count.
    async fn count(&self, query: &CountQuery) -> StoreResult<u64>;
}
