//! Propagation-aware transaction scope manager.
//!
//! # Responsibility
//! - Translate each requested propagation mode into join, suspend,
//!   savepoint or new physical transaction on the `Connection`.
//! - Resolve scopes strictly in stack order.
//! - Enforce rollback-only marks and cooperative deadlines at commit.
//!
//! # Invariants
//! - Only physical scopes (outermost or independent) commit or roll back on
//!   the connection.
//! - A suspended handle is resumed exactly when the scope that suspended it
//!   resolves, whatever the outcome.
//! - A NESTED failure undoes writes after its savepoint and truncates the
//!   owner's journal and arena undo to the same point. When the connection
//!   cannot roll back to the savepoint, the owner is marked rollback-only.
//! - Arena undo registered in a transaction is dropped when it commits and
//!   queued for `take_reverted` when it rolls back.

use crate::config::TransactionSettings;
use crate::model::record::RecordUndo;
use crate::tx::clock::{Clock, SystemClock};
use crate::tx::connection::{Connection, ConnectionError, TxHandle};
use crate::tx::context::{
    ContextRelation, JournalEntry, ScopeId, TransactionContext, TransactionStatus,
};
use crate::tx::definition::{Isolation, Propagation, TransactionDefinition};
use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;

pub type TxResult<T> = Result<T, TransactionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("propagation {0} requires an active transaction")]
    NoTransaction(Propagation),
    #[error("propagation never found an active transaction")]
    UnexpectedTransaction,
    #[error("nested scope needs savepoints, which the connection does not support")]
    SavepointUnsupported,
    #[error("transaction {scope} exceeded its deadline and was rolled back")]
    TransactionTimeout { scope: ScopeId },
    #[error("transaction {scope} was marked rollback-only and has been rolled back")]
    UnexpectedRollback { scope: ScopeId },
    #[error("scope {found} is not the innermost open scope (expected {expected:?})")]
    ScopeOrder {
        expected: Option<ScopeId>,
        found: ScopeId,
    },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Stack of open scopes over one connection.
pub struct TransactionManager<C: Connection> {
    connection: C,
    clock: Box<dyn Clock>,
    stack: Vec<TransactionContext>,
    default_timeout: Option<Duration>,
    default_isolation: Isolation,
    last_resolved: Option<TransactionContext>,
    reverted: Vec<RecordUndo>,
}

impl<C: Connection> TransactionManager<C> {
    pub fn new(connection: C) -> Self {
        Self::with_clock(connection, SystemClock)
    }

    pub fn with_clock(connection: C, clock: impl Clock + 'static) -> Self {
        Self {
            connection,
            clock: Box::new(clock),
            stack: Vec::new(),
            default_timeout: None,
            default_isolation: Isolation::Default,
            last_resolved: None,
            reverted: Vec::new(),
        }
    }

    /// Applies configured defaults to physical transactions that set none.
    pub fn with_config(connection: C, settings: &TransactionSettings) -> Self {
        let mut manager = Self::new(connection);
        manager.apply_settings(settings);
        manager
    }

    pub fn apply_settings(&mut self, settings: &TransactionSettings) {
        self.default_timeout = settings.default_timeout();
        self.default_isolation = settings.default_isolation;
    }

    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Opens a scope according to `definition.propagation`.
    ///
    /// # Errors
    /// - `NoTransaction` for MANDATORY without an active transaction.
    /// - `UnexpectedTransaction` for NEVER inside a transaction.
    /// - `SavepointUnsupported` for NESTED inside a transaction when the
    ///   connection cannot place savepoints; the active scope is untouched.
    /// - `Connection` when the connection refuses to begin or suspend.
    pub fn begin(&mut self, definition: TransactionDefinition) -> TxResult<ScopeId> {
        let current = self.current_transaction_index();
        let context = match (definition.propagation, current) {
            (Propagation::Required | Propagation::RequiresNew | Propagation::Nested, None) => {
                self.start_physical(definition, ContextRelation::Outermost)?
            }
            (
                Propagation::Required | Propagation::Supports | Propagation::Mandatory,
                Some(index),
            ) => {
                let owner = self.owner_of(index);
                let handle = self.stack[owner].handle;
                TransactionContext::new(ContextRelation::Joined { owner }, definition, handle, None)
            }
            (Propagation::RequiresNew, Some(index)) => {
                let suspended = self.suspend_handle_of(index)?;
                match self.start_physical(definition, ContextRelation::Independent { suspended }) {
                    Ok(context) => context,
                    Err(err) => {
                        self.resume_handle(suspended);
                        return Err(err);
                    }
                }
            }
            (Propagation::Nested, Some(index)) => self.start_savepoint(definition, index)?,
            (
                Propagation::Supports | Propagation::NotSupported | Propagation::Never,
                None,
            ) => TransactionContext::new(
                ContextRelation::NonTransactional { suspended: None },
                definition,
                None,
                None,
            ),
            (Propagation::NotSupported, Some(index)) => {
                let suspended = self.suspend_handle_of(index)?;
                TransactionContext::new(
                    ContextRelation::NonTransactional { suspended },
                    definition,
                    None,
                    None,
                )
            }
            (Propagation::Mandatory, None) => {
                warn!("event=tx_begin module=tx status=error propagation=mandatory error_code=no_transaction");
                return Err(TransactionError::NoTransaction(Propagation::Mandatory));
            }
            (Propagation::Never, Some(_)) => {
                warn!("event=tx_begin module=tx status=error propagation=never error_code=unexpected_transaction");
                return Err(TransactionError::UnexpectedTransaction);
            }
        };

        info!(
            "event=tx_begin module=tx status=ok scope={} propagation={} relation={} handle={} depth={}",
            context.id,
            definition.propagation,
            context.relation.label(),
            context.handle.map_or_else(|| "none".to_string(), |handle| handle.to_string()),
            self.stack.len() + 1
        );
        let id = context.id;
        self.stack.push(context);
        Ok(id)
    }

    /// Resolves the innermost scope successfully.
    ///
    /// # Errors
    /// - `ScopeOrder` when `scope` is not the innermost open scope.
    /// - `TransactionTimeout` when a physical scope outlived its deadline;
    ///   it is rolled back instead.
    /// - `UnexpectedRollback` when the scope was marked rollback-only; it is
    ///   rolled back (to its savepoint for NESTED) instead.
    /// - `Connection` when the physical commit fails; the scope is then
    ///   considered rolled back.
    pub fn commit(&mut self, scope: ScopeId) -> TxResult<()> {
        let mut context = self.pop_scope(scope)?;
        let result = match context.relation {
            ContextRelation::Outermost => self.commit_physical(&mut context),
            ContextRelation::Independent { suspended } => {
                let result = self.commit_physical(&mut context);
                self.resume_handle(suspended);
                result
            }
            ContextRelation::Joined { .. } => {
                context.status = TransactionStatus::Committed;
                Ok(())
            }
            ContextRelation::Savepoint {
                owner,
                marker,
                journal_mark,
                undo_mark,
            } => match self.stack[owner].handle {
                Some(handle) if context.status == TransactionStatus::MarkedRollback => {
                    let undone =
                        self.undo_savepoint(owner, handle, marker, journal_mark, undo_mark);
                    context.status = TransactionStatus::RolledBack;
                    undone.and(Err(TransactionError::UnexpectedRollback { scope: context.id }))
                }
                Some(handle) => {
                    let released = self
                        .connection
                        .release_savepoint(handle, marker)
                        .map_err(TransactionError::from);
                    if released.is_ok() {
                        context.status = TransactionStatus::Committed;
                    }
                    released
                }
                None => Ok(()),
            },
            ContextRelation::NonTransactional { suspended } => {
                self.resume_handle(suspended);
                context.status = TransactionStatus::Committed;
                Ok(())
            }
        };

        match &result {
            Ok(()) => info!(
                "event=tx_commit module=tx status=ok scope={} relation={} depth={}",
                context.id,
                context.relation.label(),
                self.stack.len()
            ),
            Err(err) => error!(
                "event=tx_commit module=tx status=error scope={} relation={} final_status={} error={}",
                context.id,
                context.relation.label(),
                context.status,
                err
            ),
        }
        self.last_resolved = Some(context);
        result
    }

    /// Resolves the innermost scope by undoing its work.
    ///
    /// A joined scope cannot undo anything itself: it marks the scope it
    /// joined rollback-only and that scope's commit turns into a rollback.
    pub fn rollback(&mut self, scope: ScopeId) -> TxResult<()> {
        let mut context = self.pop_scope(scope)?;
        let result = match context.relation {
            ContextRelation::Outermost => self.rollback_physical(&mut context),
            ContextRelation::Independent { suspended } => {
                let result = self.rollback_physical(&mut context);
                self.resume_handle(suspended);
                result
            }
            ContextRelation::Joined { owner } => {
                self.stack[owner].status = TransactionStatus::MarkedRollback;
                debug!(
                    "event=tx_mark_rollback module=tx status=ok scope={} owner={}",
                    context.id, self.stack[owner].id
                );
                Ok(())
            }
            ContextRelation::Savepoint {
                owner,
                marker,
                journal_mark,
                undo_mark,
            } => match self.stack[owner].handle {
                Some(handle) => {
                    self.undo_savepoint(owner, handle, marker, journal_mark, undo_mark)
                }
                None => Ok(()),
            },
            ContextRelation::NonTransactional { suspended } => {
                self.resume_handle(suspended);
                Ok(())
            }
        };
        context.status = TransactionStatus::RolledBack;

        match &result {
            Ok(()) => info!(
                "event=tx_rollback module=tx status=ok scope={} relation={} depth={}",
                context.id,
                context.relation.label(),
                self.stack.len()
            ),
            Err(err) => error!(
                "event=tx_rollback module=tx status=error scope={} relation={} error={}",
                context.id,
                context.relation.label(),
                err
            ),
        }
        self.last_resolved = Some(context);
        result
    }

    /// Runs `work` inside a scope, committing on `Ok` and rolling back on `Err`.
    ///
    /// A rollback failure is logged and the error from `work` is returned.
    pub fn execute<T, E>(
        &mut self,
        definition: TransactionDefinition,
        work: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<TransactionError>,
    {
        let scope = self.begin(definition)?;
        match work(self) {
            Ok(value) => {
                self.commit(scope)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(scope) {
                    warn!(
                        "event=tx_rollback module=tx status=error scope={scope} error_code=rollback_after_failure error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    /// Marks the transaction the innermost scope writes to as rollback-only.
    pub fn set_rollback_only(&mut self) -> TxResult<()> {
        let index = self
            .current_transaction_index()
            .ok_or(TransactionError::NoTransaction(Propagation::Mandatory))?;
        let owner = self.owner_of(index);
        self.stack[owner].status = TransactionStatus::MarkedRollback;
        Ok(())
    }

    /// Fails with `TransactionTimeout` once the active physical transaction
    /// passed its deadline, marking it rollback-only.
    pub fn check_deadline(&mut self) -> TxResult<()> {
        let Some(index) = self.current_transaction_index() else {
            return Ok(());
        };
        let physical = self.physical_of(index);
        let context = &mut self.stack[physical];
        match context.deadline {
            Some(deadline) if self.clock.now() >= deadline => {
                context.status = TransactionStatus::MarkedRollback;
                warn!(
                    "event=tx_timeout module=tx status=error scope={} error_code=deadline_exceeded",
                    context.id
                );
                Err(TransactionError::TransactionTimeout { scope: context.id })
            }
            _ => Ok(()),
        }
    }

    /// Whether the innermost scope, or the transaction it joined, is read-only.
    pub fn is_read_only(&self) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        if top.definition.read_only {
            return true;
        }
        match top.relation {
            ContextRelation::Joined { owner } | ContextRelation::Savepoint { owner, .. } => {
                self.stack[owner].definition.read_only
            }
            _ => false,
        }
    }

    pub fn has_transaction(&self) -> bool {
        self.current_transaction_index().is_some()
    }

    /// Appends executed effects to the journal of the active physical transaction.
    pub fn register(&mut self, effects: impl IntoIterator<Item = JournalEntry>) -> TxResult<()> {
        let index = self
            .current_transaction_index()
            .ok_or(TransactionError::NoTransaction(Propagation::Mandatory))?;
        let physical = self.physical_of(index);
        self.stack[physical].journal.extend(effects);
        Ok(())
    }

    /// Keeps arena state from before a plan with the active physical
    /// transaction.
    ///
    /// It is dropped when that transaction commits. When the transaction, or
    /// the savepoint active at registration, rolls back it moves to
    /// `take_reverted`.
    pub fn register_undo(&mut self, undo: impl IntoIterator<Item = RecordUndo>) -> TxResult<()> {
        let index = self
            .current_transaction_index()
            .ok_or(TransactionError::NoTransaction(Propagation::Mandatory))?;
        let physical = self.physical_of(index);
        self.stack[physical].undo.extend(undo);
        Ok(())
    }

    /// Arena state released by rollbacks since the last call, oldest first.
    pub fn take_reverted(&mut self) -> Vec<RecordUndo> {
        std::mem::take(&mut self.reverted)
    }

    /// Journal of the active physical transaction; empty without one.
    pub fn journal(&self) -> &[JournalEntry] {
        self.current_transaction_index()
            .map_or(&[][..], |index| self.stack[self.physical_of(index)].journal())
    }

    /// Innermost open scope.
    pub fn current(&self) -> Option<&TransactionContext> {
        self.stack.last()
    }

    pub fn context(&self, scope: ScopeId) -> Option<&TransactionContext> {
        self.stack.iter().find(|context| context.id == scope)
    }

    /// Most recently resolved scope with its final status.
    pub fn last_resolved(&self) -> Option<&TransactionContext> {
        self.last_resolved.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Top of the stack when it takes part in a transaction.
    fn current_transaction_index(&self) -> Option<usize> {
        let index = self.stack.len().checked_sub(1)?;
        self.stack[index].is_transactional().then_some(index)
    }

    /// Scope whose status a participant at `index` reports into.
    fn owner_of(&self, index: usize) -> usize {
        match self.stack[index].relation {
            ContextRelation::Joined { owner } => owner,
            _ => index,
        }
    }

    fn physical_of(&self, index: usize) -> usize {
        match self.stack[index].relation {
            ContextRelation::Joined { owner } | ContextRelation::Savepoint { owner, .. } => {
                self.physical_of(owner)
            }
            _ => index,
        }
    }

    fn start_physical(
        &mut self,
        definition: TransactionDefinition,
        relation: ContextRelation,
    ) -> TxResult<TransactionContext> {
        let mut definition = definition;
        if definition.isolation == Isolation::Default {
            definition.isolation = self.default_isolation;
        }
        if definition.timeout.is_none() {
            definition.timeout = self.default_timeout;
        }
        let handle = self.connection.begin(&definition)?;
        let deadline = definition.timeout.map(|timeout| self.clock.now() + timeout);
        Ok(TransactionContext::new(
            relation,
            definition,
            Some(handle),
            deadline,
        ))
    }

    fn start_savepoint(
        &mut self,
        definition: TransactionDefinition,
        index: usize,
    ) -> TxResult<TransactionContext> {
        if !self.connection.supports_savepoints() {
            warn!("event=tx_savepoint module=tx status=error error_code=savepoint_unsupported");
            return Err(TransactionError::SavepointUnsupported);
        }
        let owner = self.physical_of(index);
        let Some(handle) = self.stack[owner].handle else {
            return Err(TransactionError::SavepointUnsupported);
        };
        let marker = self.connection.savepoint(handle)?;
        debug!("event=tx_savepoint module=tx status=ok handle={handle} marker={marker}");
        Ok(TransactionContext::new(
            ContextRelation::Savepoint {
                owner,
                marker,
                journal_mark: self.stack[owner].journal.len(),
                undo_mark: self.stack[owner].undo.len(),
            },
            definition,
            Some(handle),
            None,
        ))
    }

    fn suspend_handle_of(&mut self, index: usize) -> TxResult<Option<TxHandle>> {
        let Some(handle) = self.stack[self.physical_of(index)].handle else {
            return Ok(None);
        };
        self.connection.suspend(handle)?;
        debug!("event=tx_suspend module=tx status=ok handle={handle}");
        Ok(Some(handle))
    }

    fn resume_handle(&mut self, suspended: Option<TxHandle>) {
        let Some(handle) = suspended else {
            return;
        };
        match self.connection.resume(handle) {
            Ok(()) => debug!("event=tx_resume module=tx status=ok handle={handle}"),
            Err(err) => error!(
                "event=tx_resume module=tx status=error handle={handle} error={err}"
            ),
        }
    }

    fn commit_physical(&mut self, context: &mut TransactionContext) -> TxResult<()> {
        let Some(handle) = context.handle else {
            return Ok(());
        };
        let expired = context
            .deadline
            .is_some_and(|deadline| self.clock.now() >= deadline);
        if expired || context.status == TransactionStatus::MarkedRollback {
            context.status = TransactionStatus::RolledBack;
            self.reverted.append(&mut context.undo);
            self.connection.rollback(handle)?;
            return Err(if expired {
                TransactionError::TransactionTimeout { scope: context.id }
            } else {
                TransactionError::UnexpectedRollback { scope: context.id }
            });
        }
        match self.connection.commit(handle) {
            Ok(()) => {
                context.status = TransactionStatus::Committed;
                context.undo.clear();
                Ok(())
            }
            Err(err) => {
                context.status = TransactionStatus::RolledBack;
                self.reverted.append(&mut context.undo);
                Err(err.into())
            }
        }
    }

    fn rollback_physical(&mut self, context: &mut TransactionContext) -> TxResult<()> {
        self.reverted.append(&mut context.undo);
        match context.handle {
            Some(handle) => Ok(self.connection.rollback(handle)?),
            None => Ok(()),
        }
    }

    fn undo_savepoint(
        &mut self,
        owner: usize,
        handle: TxHandle,
        marker: crate::tx::connection::SavepointMarker,
        journal_mark: usize,
        undo_mark: usize,
    ) -> TxResult<()> {
        if let Err(err) = self.connection.rollback_to(handle, marker) {
            // writes after the savepoint are still in the transaction
            self.stack[owner].status = TransactionStatus::MarkedRollback;
            return Err(err.into());
        }
        let owner_context = &mut self.stack[owner];
        owner_context.journal.truncate(journal_mark);
        let undone = owner_context.undo.split_off(undo_mark.min(owner_context.undo.len()));
        self.reverted.extend(undone);
        self.connection.release_savepoint(handle, marker)?;
        debug!("event=tx_savepoint module=tx status=ok action=rollback_to handle={handle} marker={marker}");
        Ok(())
    }

    fn pop_scope(&mut self, scope: ScopeId) -> TxResult<TransactionContext> {
        let expected = self.stack.last().map(TransactionContext::id);
        if expected != Some(scope) {
            return Err(TransactionError::ScopeOrder {
                expected,
                found: scope,
            });
        }
        self.stack.pop().ok_or(TransactionError::ScopeOrder {
            expected: None,
            found: scope,
        })
    }
}

impl<C: Connection> Drop for TransactionManager<C> {
    fn drop(&mut self) {
        while let Some(context) = self.stack.pop() {
            if let (true, Some(handle)) = (context.is_physical(), context.handle) {
                warn!(
                    "event=tx_rollback module=tx status=ok scope={} error_code=dropped_open_scope",
                    context.id
                );
                if let Err(err) = self.connection.rollback(handle) {
                    error!(
                        "event=tx_rollback module=tx status=error scope={} handle={handle} error_code=dropped_open_scope error={err}",
                        context.id
                    );
                }
            }
        }
    }
}
