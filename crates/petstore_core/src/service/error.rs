//! Unit-of-work error taxonomy.

use crate::cascade::CascadeError;
use crate::model::record::{ArenaError, NodeId, RecordId};
use crate::model::schema::RecordType;
use crate::store::StoreError;
use crate::tx::TransactionError;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type PersistResult<T> = Result<T, PersistError>;

/// Step of `UnitOfWork::execute` an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistStage {
    Begin,
    Plan,
    Write,
    Commit,
}

impl Display for PersistStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Begin => "begin",
            Self::Plan => "plan",
            Self::Write => "write",
            Self::Commit => "commit",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{stage}: {source}")]
    Transaction {
        stage: PersistStage,
        #[source]
        source: TransactionError,
    },
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("read-only transaction cannot apply a plan of {entries} writes")]
    ReadOnlyViolation { entries: usize },
    #[error("{record_type} #{id} not found")]
    NotFound { record_type: RecordType, id: RecordId },
    #[error("arena node {0} has no identity at write time")]
    Unresolved(NodeId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PersistError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { record_type, id } => Self::NotFound { record_type, id },
            other => Self::Store(other),
        }
    }
}

impl PersistError {
    pub(crate) fn at(stage: PersistStage) -> impl FnOnce(TransactionError) -> Self {
        move |source| Self::Transaction { stage, source }
    }

    pub fn stage(&self) -> PersistStage {
        match self {
            Self::Transaction { stage, .. } => *stage,
            Self::Cascade(_) | Self::Arena(_) | Self::ReadOnlyViolation { .. } => {
                PersistStage::Plan
            }
            Self::NotFound { .. } | Self::Unresolved(_) | Self::Store(_) => PersistStage::Write,
        }
    }

    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            Self::Transaction { source, .. } => Some(source),
            _ => None,
        }
    }
}
