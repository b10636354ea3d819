//! Persistence-cascade engine and transaction-propagation manager for the
//! petstore record graph.
//! This crate owns every cascade and transaction invariant; adapters only
//! store what they are told.

pub mod cascade;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod tx;

pub use cascade::{plan, CascadeError, CascadeResult, Operation, PlanAction, PlanEntry, WritePlan};
pub use config::{ConfigError, CoreConfig, TransactionSettings};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::{
    ArenaError, ArenaId, AttrValue, Attributes, NodeId, Record, RecordArena, RecordId,
    RecordUndo,
};
pub use model::schema::{
    Cardinality, CascadeKind, CascadeSet, EdgeDecl, EdgeSpec, InverseSpec, OnDelete, RecordType,
    Schema, SchemaError, SchemaResult,
};
pub use service::{ExecutionReport, PersistError, PersistResult, PersistStage, UnitOfWork};
pub use store::{MemoryDatabase, MemorySession, SqliteDatabase, Store, StoreError, StoreResult};
pub use tx::{
    Connection, ConnectionError, Isolation, Propagation, TransactionDefinition, TransactionError,
    TransactionManager, TransactionStatus, TransactionTracker,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
