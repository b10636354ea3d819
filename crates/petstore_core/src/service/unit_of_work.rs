//! Unit-of-work coordinator.
//!
//! # Responsibility
//! - Wrap each save/delete in a transaction scope with the requested
//!   propagation.
//! - Run the cascade plan against the store in plan order.
//! - Resynchronize the arena with what the store now holds.
//!
//! # Invariants
//! - A failed plan or write rolls back the scope before the error returns.
//! - Executed entries reach the transaction journal in execution order.
//! - Without an active transaction, writes still run inside one short local
//!   transaction.
//! - Arena state a plan changed comes back once its transaction, or the
//!   savepoint it ran under, rolls back; `save`/`delete` reconcile on entry
//!   and after their own rollback, `reconcile` does it on demand.

use crate::cascade::{self, Operation, PlanAction, WritePlan};
use crate::model::record::{AttrValue, Attributes, NodeId, RecordArena, RecordId, RecordUndo};
use crate::model::schema::{Cardinality, RecordType};
use crate::service::error::{PersistError, PersistResult, PersistStage};
use crate::store::Store;
use crate::tx::{
    Connection, JournalEntry, Propagation, TransactionDefinition, TransactionManager,
};
use log::{info, warn};
use std::time::Instant;

/// What one `execute` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub plan: WritePlan,
    /// Executed entries with final identities, in execution order.
    pub executed: Vec<JournalEntry>,
    /// The plan ran in a local transaction because the scope had none.
    pub local_transaction: bool,
}

pub struct UnitOfWork<S: Store, C: Connection> {
    store: S,
    transactions: TransactionManager<C>,
    /// Rolled-back arena state not yet handed to its arena.
    reverted: Vec<RecordUndo>,
}

impl<S: Store, C: Connection> UnitOfWork<S, C> {
    pub fn new(store: S, connection: C) -> Self {
        Self::with_manager(store, TransactionManager::new(connection))
    }

    pub fn with_manager(store: S, transactions: TransactionManager<C>) -> Self {
        Self {
            store,
            transactions,
            reverted: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transaction_manager(&self) -> &TransactionManager<C> {
        &self.transactions
    }

    pub fn transaction_manager_mut(&mut self) -> &mut TransactionManager<C> {
        &mut self.transactions
    }

    /// Inserts or updates `root` and everything its cascades reach.
    pub fn save(
        &mut self,
        arena: &mut RecordArena,
        root: NodeId,
        definition: TransactionDefinition,
    ) -> PersistResult<ExecutionReport> {
        self.execute(arena, Operation::CreateOrUpdate, root, definition)
    }

    /// Deletes `root` and its delete-cascading dependants.
    pub fn delete(
        &mut self,
        arena: &mut RecordArena,
        root: NodeId,
        definition: TransactionDefinition,
    ) -> PersistResult<ExecutionReport> {
        self.execute(arena, Operation::Delete, root, definition)
    }

    /// Plans and applies one root mutation inside a scope of `definition`.
    ///
    /// # Errors
    /// - `Transaction` at `Begin` when the propagation mode refuses to open.
    /// - `Transaction` at `Plan` when the deadline already passed.
    /// - `Cascade` / `ReadOnlyViolation` when planning rejects the mutation.
    /// - `Store` / `NotFound` when a write fails.
    /// - `Transaction` at `Commit` when the scope cannot commit.
    pub fn execute(
        &mut self,
        arena: &mut RecordArena,
        operation: Operation,
        root: NodeId,
        definition: TransactionDefinition,
    ) -> PersistResult<ExecutionReport> {
        let started_at = Instant::now();
        self.reconcile(arena);
        let scope = self
            .transactions
            .begin(definition)
            .map_err(PersistError::at(PersistStage::Begin))?;

        let report = match self.run_in_scope(arena, operation, root) {
            Ok(report) => report,
            Err(err) => {
                if let Err(rollback_err) = self.transactions.rollback(scope) {
                    warn!("event=uow_execute module=service status=error scope={scope} error_code=rollback_failed error={rollback_err}");
                }
                self.reconcile(arena);
                warn!(
                    "event=uow_execute module=service status=error operation={} root={} stage={} error={}",
                    operation,
                    root,
                    err.stage(),
                    err
                );
                return Err(err);
            }
        };

        if let Err(err) = self.transactions.commit(scope) {
            self.reconcile(arena);
            return Err(PersistError::at(PersistStage::Commit)(err));
        }

        info!(
            "event=uow_execute module=service status=ok operation={} root={} propagation={} entries={} local_tx={} duration_ms={}",
            operation,
            root,
            definition.propagation,
            report.plan.len(),
            report.local_transaction,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Runs `work` inside one scope, committing on `Ok` and rolling back on `Err`.
    pub fn transactional<T>(
        &mut self,
        definition: TransactionDefinition,
        work: impl FnOnce(&mut Self) -> PersistResult<T>,
    ) -> PersistResult<T> {
        let scope = self
            .transactions
            .begin(definition)
            .map_err(PersistError::at(PersistStage::Begin))?;
        match work(self) {
            Ok(value) => {
                self.transactions
                    .commit(scope)
                    .map_err(PersistError::at(PersistStage::Commit))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.transactions.rollback(scope) {
                    warn!("event=uow_transactional module=service status=error scope={scope} error_code=rollback_failed error={rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Puts records whose transaction rolled back back into the state they
    /// had before it ran, so the arena matches the store again.
    ///
    /// Use it after a failed `transactional` block; undo taken from another
    /// arena waits for that arena. Returns the number of records restored.
    pub fn reconcile(&mut self, arena: &mut RecordArena) -> usize {
        self.reverted.extend(self.transactions.take_reverted());
        if self.reverted.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.reverted);
        let before = pending.len();
        self.reverted = arena.restore(pending);
        let restored = before - self.reverted.len();
        if restored > 0 {
            info!(
                "event=uow_reconcile module=service status=ok arena={} restored={} pending={}",
                arena.arena_id(),
                restored,
                self.reverted.len()
            );
        }
        restored
    }

    /// Returns the arena node holding `record_type #id`, loading it when absent.
    pub fn load(
        &self,
        arena: &mut RecordArena,
        record_type: RecordType,
        id: RecordId,
    ) -> PersistResult<NodeId> {
        if let Some(node) = arena.find(record_type, id) {
            return Ok(node);
        }
        let attrs = self.store.load(record_type, id)?;
        Ok(arena.hydrate(record_type, id, attrs)?)
    }

    /// Loads the stored targets of a many-to-many edge into the arena.
    pub fn load_associations(
        &self,
        arena: &mut RecordArena,
        owner: NodeId,
        edge: &str,
    ) -> PersistResult<Vec<NodeId>> {
        let spec = *arena
            .schema()
            .edge(edge)
            .ok_or_else(|| crate::model::record::ArenaError::UnknownEdge(edge.to_string()))?;
        let owner_id = arena.id(owner).ok_or(PersistError::Unresolved(owner))?;
        let mut targets = Vec::new();
        for target_id in self.store.linked(spec.join_column, owner_id)? {
            let target = self.load(arena, spec.target, target_id)?;
            arena.hydrate_link(owner, spec.name, target)?;
            targets.push(target);
        }
        Ok(targets)
    }

    pub fn count(&self, record_type: RecordType) -> PersistResult<usize> {
        Ok(self.store.count(record_type)?)
    }

    fn run_in_scope(
        &mut self,
        arena: &mut RecordArena,
        operation: Operation,
        root: NodeId,
    ) -> PersistResult<ExecutionReport> {
        self.transactions
            .check_deadline()
            .map_err(PersistError::at(PersistStage::Plan))?;

        let plan = cascade::plan(arena, operation, root)?;
        if plan.is_empty() {
            resync(arena, &plan);
            return Ok(ExecutionReport {
                plan,
                executed: Vec::new(),
                local_transaction: false,
            });
        }
        if self.transactions.is_read_only() {
            return Err(PersistError::ReadOnlyViolation {
                entries: plan.len(),
            });
        }

        if self.transactions.has_transaction() {
            self.transactions
                .register_undo(arena.capture(plan_nodes(&plan)))
                .map_err(PersistError::at(PersistStage::Write))?;
            let executed = self.apply(arena, &plan)?;
            self.transactions
                .register(executed.iter().copied())
                .map_err(PersistError::at(PersistStage::Write))?;
            resync(arena, &plan);
            return Ok(ExecutionReport {
                plan,
                executed,
                local_transaction: false,
            });
        }

        let local = TransactionDefinition::new(Propagation::Required);
        let executed = self.transactional(local, |uow| {
            uow.transactions
                .register_undo(arena.capture(plan_nodes(&plan)))
                .map_err(PersistError::at(PersistStage::Write))?;
            let executed = uow.apply(arena, &plan)?;
            uow.transactions
                .register(executed.iter().copied())
                .map_err(PersistError::at(PersistStage::Write))?;
            Ok(executed)
        })?;
        resync(arena, &plan);
        Ok(ExecutionReport {
            plan,
            executed,
            local_transaction: true,
        })
    }

    /// Executes plan entries in order; inserted identities go straight into the arena.
    fn apply(&self, arena: &mut RecordArena, plan: &WritePlan) -> PersistResult<Vec<JournalEntry>> {
        let mut executed = Vec::with_capacity(plan.len());
        for entry in &plan.entries {
            let id = match entry.action {
                PlanAction::Insert => {
                    let attrs = row_attributes(arena, entry.node, None)?;
                    let id = self.store.insert(entry.record_type, &attrs)?;
                    arena.assign_id(entry.node, id);
                    id
                }
                PlanAction::Update => {
                    let id = identity(arena, entry.node)?;
                    let attrs = row_attributes(arena, entry.node, None)?;
                    self.store.update(entry.record_type, id, &attrs)?;
                    id
                }
                PlanAction::Delete => {
                    let id = identity(arena, entry.node)?;
                    self.store.delete(entry.record_type, id)?;
                    id
                }
                PlanAction::Link { edge, target } | PlanAction::Unlink { edge, target } => {
                    let id = identity(arena, entry.node)?;
                    let target_id = identity(arena, target)?;
                    let join = join_column(arena, edge)?;
                    if matches!(entry.action, PlanAction::Link { .. }) {
                        self.store.link(join, id, target_id)?;
                    } else {
                        self.store.unlink(join, id, target_id)?;
                    }
                    id
                }
                PlanAction::ClearReference { edge } => {
                    let id = identity(arena, entry.node)?;
                    let attrs = row_attributes(arena, entry.node, Some(edge))?;
                    self.store.update(entry.record_type, id, &attrs)?;
                    id
                }
            };
            executed.push(JournalEntry {
                action: entry.action,
                record_type: entry.record_type,
                id,
            });
        }
        Ok(executed)
    }
}

/// Every node an applied plan may change in the arena.
fn plan_nodes(plan: &WritePlan) -> impl Iterator<Item = NodeId> + '_ {
    plan.entries
        .iter()
        .map(|entry| entry.node)
        .chain(plan.touched.iter().copied())
}

fn identity(arena: &RecordArena, node: NodeId) -> PersistResult<RecordId> {
    arena.id(node).ok_or(PersistError::Unresolved(node))
}

fn join_column(arena: &RecordArena, edge: &str) -> PersistResult<&'static str> {
    arena
        .schema()
        .edge(edge)
        .map(|spec| spec.join_column)
        .ok_or_else(|| crate::model::record::ArenaError::UnknownEdge(edge.to_string()).into())
}

/// Scalar attributes plus the foreign keys the graph currently implies.
///
/// A relationship the arena does not hold keeps whatever key the record was
/// loaded with; `cleared` forces one edge's key to null.
fn row_attributes(
    arena: &RecordArena,
    node: NodeId,
    cleared: Option<&str>,
) -> PersistResult<Attributes> {
    let record = arena.record(node)?;
    let schema = arena.schema();
    let mut attrs = record.attrs().clone();

    for (edge, parent) in record.parents() {
        if let Some(spec) = schema.edge(edge) {
            attrs.insert(spec.join_column.to_string(), arena.id(parent).into());
        }
    }
    for spec in schema
        .edges_from(record.record_type())
        .filter(|spec| spec.cardinality == Cardinality::ManyToOne)
    {
        if let Some(target) = arena.reference(node, spec.name) {
            attrs.insert(spec.join_column.to_string(), arena.id(target).into());
        }
    }
    if let Some(spec) = cleared.and_then(|edge| schema.edge(edge)) {
        attrs.insert(spec.join_column.to_string(), AttrValue::Null);
    }
    Ok(attrs)
}

/// Brings the arena in line with an applied plan.
fn resync(arena: &mut RecordArena, plan: &WritePlan) {
    for entry in &plan.entries {
        match entry.action {
            PlanAction::Delete => arena.mark_removed(entry.node),
            PlanAction::ClearReference { edge } => arena.clear_parent(entry.node, edge),
            _ => {}
        }
    }
    for &node in &plan.touched {
        if arena.get(node).is_some_and(|record| !record.is_removed()) {
            arena.mark_synced(node);
        }
    }
}
