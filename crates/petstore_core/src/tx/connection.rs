//! Physical transaction collaborator.
//!
//! # Responsibility
//! - Open, commit and roll back physical transactions.
//! - Place and resolve savepoints inside an open transaction.
//! - Bind the handle a `Store` routes its writes through.
//!
//! # Invariants
//! - A handle is resolved (commit or rollback) at most once.
//! - `suspend` unbinds a handle without resolving it; `resume` rebinds it.

use crate::tx::definition::TransactionDefinition;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Opaque identifier of one physical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHandle(pub u64);

impl Display for TxHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Opaque savepoint position inside one physical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SavepointMarker(pub u64);

impl Display for SavepointMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sp{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("unknown or already resolved transaction {0}")]
    UnknownHandle(TxHandle),
    #[error("unknown savepoint {marker} in {handle}")]
    UnknownSavepoint {
        handle: TxHandle,
        marker: SavepointMarker,
    },
    #[error("savepoints are not supported by this connection")]
    SavepointsUnsupported,
    #[error("connection busy: {0}")]
    Busy(String),
    #[error("connection failure: {0}")]
    Failure(String),
}

/// Physical transaction API consumed by `TransactionManager`.
pub trait Connection {
    /// Opens a physical transaction and binds it as the current one.
    fn begin(&self, definition: &TransactionDefinition) -> ConnectionResult<TxHandle>;

    /// Makes all writes under `handle` durable and unbinds it.
    fn commit(&self, handle: TxHandle) -> ConnectionResult<()>;

    /// Discards all writes under `handle` and unbinds it.
    fn rollback(&self, handle: TxHandle) -> ConnectionResult<()>;

    fn savepoint(&self, handle: TxHandle) -> ConnectionResult<SavepointMarker>;

    /// Undoes writes made after `marker`; the transaction stays open.
    fn rollback_to(&self, handle: TxHandle, marker: SavepointMarker) -> ConnectionResult<()>;

    fn release_savepoint(&self, _handle: TxHandle, _marker: SavepointMarker) -> ConnectionResult<()> {
        Ok(())
    }

    fn supports_savepoints(&self) -> bool;

    /// Unbinds `handle` so later writes do not run inside it.
    fn suspend(&self, _handle: TxHandle) -> ConnectionResult<()> {
        Ok(())
    }

    /// Rebinds a previously suspended `handle`.
    fn resume(&self, _handle: TxHandle) -> ConnectionResult<()> {
        Ok(())
    }
}
