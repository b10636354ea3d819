//! Transaction scope records kept on the manager's stack.

use crate::cascade::PlanAction;
use crate::model::record::{RecordId, RecordUndo};
use crate::model::schema::RecordType;
use crate::tx::connection::{SavepointMarker, TxHandle};
use crate::tx::definition::TransactionDefinition;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Identity of one begun scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Active => "active",
            Self::MarkedRollback => "marked_rollback",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(text)
    }
}

/// How a scope relates to the scopes below it on the stack.
///
/// `owner` values are stack indexes of scopes that always sit below the
/// scope holding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRelation {
    /// Physical transaction started with nothing active.
    Outermost,
    /// Participates in the transaction of `owner`.
    Joined { owner: usize },
    /// Physical transaction started while `suspended` was put aside.
    Independent { suspended: Option<TxHandle> },
    /// Savepoint inside the physical transaction at `owner`.
    ///
    /// The marks are the owner's journal and undo lengths when it was placed.
    Savepoint {
        owner: usize,
        marker: SavepointMarker,
        journal_mark: usize,
        undo_mark: usize,
    },
    /// Runs without a transaction, hiding any transaction below it.
    NonTransactional { suspended: Option<TxHandle> },
}

impl ContextRelation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Outermost => "outermost",
            Self::Joined { .. } => "joined",
            Self::Independent { .. } => "independent",
            Self::Savepoint { .. } => "savepoint",
            Self::NonTransactional { .. } => "non_transactional",
        }
    }
}

/// One executed store effect, with its final identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub action: PlanAction,
    pub record_type: RecordType,
    pub id: RecordId,
}

#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub(crate) id: ScopeId,
    pub(crate) relation: ContextRelation,
    pub(crate) status: TransactionStatus,
    pub(crate) definition: TransactionDefinition,
    pub(crate) deadline: Option<Instant>,
    pub(crate) handle: Option<TxHandle>,
    pub(crate) journal: Vec<JournalEntry>,
    pub(crate) undo: Vec<RecordUndo>,
}

impl TransactionContext {
    pub(crate) fn new(
        relation: ContextRelation,
        definition: TransactionDefinition,
        handle: Option<TxHandle>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            id: ScopeId::new(),
            relation,
            status: TransactionStatus::Active,
            definition,
            deadline,
            handle,
            journal: Vec::new(),
            undo: Vec::new(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn relation(&self) -> ContextRelation {
        self.relation
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Physical transaction this scope writes through, if any.
    pub fn handle(&self) -> Option<TxHandle> {
        self.handle
    }

    /// Effects executed in this physical transaction, in execution order.
    ///
    /// Empty for scopes that do not own a physical transaction.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Owns a physical transaction on the connection.
    pub fn is_physical(&self) -> bool {
        matches!(
            self.relation,
            ContextRelation::Outermost | ContextRelation::Independent { .. }
        )
    }

    pub fn is_transactional(&self) -> bool {
        !matches!(self.relation, ContextRelation::NonTransactional { .. })
    }
}
