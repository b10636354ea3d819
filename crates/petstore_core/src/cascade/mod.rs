//! Cascade engine.
//!
//! # Responsibility
//! - Expand one root mutation into the ordered list of store effects implied
//!   by the schema's cascade policy.
//! - Detect orphans and many-to-many association changes.
//!
//! # Invariants
//! - Inserts follow owner-before-dependant order; deletes mirror it.
//! - Planning is pure: the same arena state yields the same plan.

mod engine;
pub mod plan;

use crate::model::record::{ArenaError, NodeId};
use thiserror::Error;

pub use engine::plan;
pub use plan::{Operation, PlanAction, PlanEntry, WritePlan};

pub type CascadeResult<T> = Result<T, CascadeError>;

/// Errors raised while building a write plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    /// A child's inverse pointer disagrees with the collection it sits in.
    #[error("edge `{edge}`: child {child} of {owner} points back to {found:?}")]
    GraphConsistency {
        edge: &'static str,
        owner: NodeId,
        child: NodeId,
        found: Option<NodeId>,
    },
    /// A write references a record that will not exist in the store.
    #[error("edge `{edge}`: {node} references transient {target} that is not saved first")]
    TransientReference {
        edge: &'static str,
        node: NodeId,
        target: NodeId,
    },
    #[error(transparent)]
    Arena(#[from] ArenaError),
}
