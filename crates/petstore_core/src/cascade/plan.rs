//! Write plan produced by the cascade engine.

use crate::model::record::{NodeId, RecordId};
use crate::model::schema::RecordType;
use std::fmt::{Display, Formatter};

/// Root mutation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrUpdate,
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateOrUpdate => f.write_str("create_or_update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Store-side effect of one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanAction {
    Insert,
    Update,
    Delete,
    /// Adds a many-to-many association row from the entry record to `target`.
    Link { edge: &'static str, target: NodeId },
    /// Drops a many-to-many association row; `target` itself is kept.
    Unlink { edge: &'static str, target: NodeId },
    /// Clears the entry record's reference to an owner that is being deleted.
    ClearReference { edge: &'static str },
}

impl PlanAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
            Self::ClearReference { .. } => "clear_reference",
        }
    }
}

/// `(action, record type, identity-or-null)` plus the arena node it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanEntry {
    pub action: PlanAction,
    pub record_type: RecordType,
    /// Identity at planning time; `None` for records still to be inserted.
    pub id: Option<RecordId>,
    pub node: NodeId,
}

impl Display for PlanEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}#{}", self.action.label(), self.record_type, id),
            None => write!(f, "{} {}{}", self.action.label(), self.record_type, self.node),
        }
    }
}

/// Ordered list of store effects for one root mutation.
///
/// Entries must be applied strictly in order; `touched` lists the records
/// whose in-memory state is resynchronized once the plan succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub operation: Option<Operation>,
    pub entries: Vec<PlanEntry>,
    pub touched: Vec<NodeId>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record types of entries matching `action`, in plan order.
    pub fn types_for(&self, action: PlanAction) -> Vec<RecordType> {
        self.entries
            .iter()
            .filter(|entry| entry.action == action)
            .map(|entry| entry.record_type)
            .collect()
    }

    /// Whether any entry of the plan targets `node`.
    pub fn touches_record(&self, node: NodeId) -> bool {
        self.entries.iter().any(|entry| entry.node == node)
    }
}
