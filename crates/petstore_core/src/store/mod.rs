//! Record store collaborators.
//!
//! # Responsibility
//! - Define the `Store` contract the unit of work writes plans through.
//! - Provide an in-memory and a SQLite-backed implementation that also act
//!   as the transaction `Connection`.
//!
//! # Invariants
//! - Identities are assigned by the store on insert and never reused.
//! - Writes issued while a transaction handle is bound belong to that
//!   transaction; otherwise they are durable immediately.
//! - Foreign keys travel as ordinary attributes named after the edge's join
//!   column; the store does not interpret them.

use crate::model::record::{Attributes, RecordId};
use crate::model::schema::RecordType;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryDatabase, MemorySession};
pub use sqlite::SqliteDatabase;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{record_type} #{id} not found")]
    NotFound { record_type: RecordType, id: RecordId },
    #[error("{record_type} #{id} is locked by another open transaction")]
    Conflict { record_type: RecordType, id: RecordId },
    #[error("write to {record_type} rejected: transaction is read-only")]
    ReadOnly { record_type: RecordType },
    #[error("store failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("attribute encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Record persistence API consumed by the unit of work.
pub trait Store {
    /// Inserts a new row and returns its store-assigned identity.
    fn insert(&self, record_type: RecordType, attrs: &Attributes) -> StoreResult<RecordId>;

    /// Replaces the attributes of an existing row.
    fn update(&self, record_type: RecordType, id: RecordId, attrs: &Attributes)
        -> StoreResult<()>;

    fn delete(&self, record_type: RecordType, id: RecordId) -> StoreResult<()>;

    /// # Errors
    /// - `NotFound` when no row has this identity.
    fn load(&self, record_type: RecordType, id: RecordId) -> StoreResult<Attributes>;

    /// Adds an association row; adding an existing one is a no-op.
    fn link(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()>;

    fn unlink(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()>;

    /// Targets associated with `owner` through `join`, in ascending order.
    fn linked(&self, join: &str, owner: RecordId) -> StoreResult<Vec<RecordId>>;

    fn count(&self, record_type: RecordType) -> StoreResult<usize>;
}
