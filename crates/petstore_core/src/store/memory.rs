//! In-memory record store with undo-log transactions.
//!
//! # Responsibility
//! - Keep record tables and association rows shared by all sessions.
//! - Give every open physical transaction an undo log and a set of row locks.
//! - Record transaction events in a `TransactionTracker`.
//!
//! # Invariants
//! - A row written by an open transaction cannot be written by anyone else
//!   until that transaction resolves (`StoreError::Conflict`).
//! - Rolling back replays the undo log newest first; a savepoint is the undo
//!   log length at the time it was placed.
//! - Identity sequences never move backwards, even on rollback.

use crate::config::TransactionSettings;
use crate::model::record::{Attributes, RecordId};
use crate::model::schema::RecordType;
use crate::store::{Store, StoreError, StoreResult};
use crate::tx::{
    Connection, ConnectionError, ConnectionResult, SavepointMarker, TransactionDefinition,
    TransactionEvent, TransactionTracker, TxHandle,
};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

type SessionId = u64;
type LinkRow = (String, RecordId, RecordId);

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RecordId, Attributes>,
    last_id: RecordId,
}

#[derive(Debug)]
enum Undo {
    Inserted(RecordType, RecordId),
    Replaced(RecordType, RecordId, Attributes),
    Linked(LinkRow),
    Unlinked(LinkRow),
}

#[derive(Debug)]
struct OpenTransaction {
    session: SessionId,
    read_only: bool,
    undo: Vec<Undo>,
    locks: HashSet<(RecordType, RecordId)>,
    savepoints: Vec<(SavepointMarker, usize)>,
}

#[derive(Debug)]
struct Inner {
    tables: BTreeMap<RecordType, Table>,
    links: BTreeSet<LinkRow>,
    open: HashMap<TxHandle, OpenTransaction>,
    bound: HashMap<SessionId, TxHandle>,
    next_handle: u64,
    next_marker: u64,
    next_session: SessionId,
    savepoints: bool,
    failing_inserts: HashSet<RecordType>,
    fail_next_commit: bool,
}

impl Inner {
    fn new(savepoints: bool) -> Self {
        Self {
            tables: BTreeMap::new(),
            links: BTreeSet::new(),
            open: HashMap::new(),
            bound: HashMap::new(),
            next_handle: 0,
            next_marker: 0,
            next_session: 0,
            savepoints,
            failing_inserts: HashSet::new(),
            fail_next_commit: false,
        }
    }

    /// Open transaction the session's writes go to, if any.
    fn writer(&mut self, session: SessionId, record_type: RecordType) -> StoreResult<Option<TxHandle>> {
        let Some(&handle) = self.bound.get(&session) else {
            return Ok(None);
        };
        match self.open.get(&handle) {
            Some(open) if open.read_only => Err(StoreError::ReadOnly { record_type }),
            Some(_) => Ok(Some(handle)),
            None => Ok(None),
        }
    }

    fn lock_row(
        &mut self,
        writer: Option<TxHandle>,
        record_type: RecordType,
        id: RecordId,
    ) -> StoreResult<()> {
        let key = (record_type, id);
        let held_elsewhere = self
            .open
            .iter()
            .any(|(handle, open)| Some(*handle) != writer && open.locks.contains(&key));
        if held_elsewhere {
            return Err(StoreError::Conflict { record_type, id });
        }
        if let Some(open) = writer.and_then(|handle| self.open.get_mut(&handle)) {
            open.locks.insert(key);
        }
        Ok(())
    }

    fn log_undo(&mut self, writer: Option<TxHandle>, undo: Undo) {
        if let Some(open) = writer.and_then(|handle| self.open.get_mut(&handle)) {
            open.undo.push(undo);
        }
    }

    fn apply_undo(&mut self, entries: impl DoubleEndedIterator<Item = Undo>) {
        for entry in entries.rev() {
            match entry {
                Undo::Inserted(record_type, id) => {
                    if let Some(table) = self.tables.get_mut(&record_type) {
                        table.rows.remove(&id);
                    }
                }
                Undo::Replaced(record_type, id, attrs) => {
                    self.tables
                        .entry(record_type)
                        .or_default()
                        .rows
                        .insert(id, attrs);
                }
                Undo::Linked(row) => {
                    self.links.remove(&row);
                }
                Undo::Unlinked(row) => {
                    self.links.insert(row);
                }
            }
        }
    }

    fn close(&mut self, handle: TxHandle) -> ConnectionResult<OpenTransaction> {
        let open = self
            .open
            .remove(&handle)
            .ok_or(ConnectionError::UnknownHandle(handle))?;
        if self.bound.get(&open.session) == Some(&handle) {
            self.bound.remove(&open.session);
        }
        Ok(open)
    }
}

/// Shared in-memory database; `connect` opens sessions on it.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
    tracker: TransactionTracker,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Database whose connections refuse savepoints.
    pub fn without_savepoints() -> Self {
        Self::build(false)
    }

    pub fn from_settings(settings: &TransactionSettings) -> Self {
        Self::build(settings.savepoints)
    }

    fn build(savepoints: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(savepoints))),
            tracker: TransactionTracker::new(),
        }
    }

    /// Opens a new session with its own transaction binding.
    pub fn connect(&self) -> MemorySession {
        let session = {
            let mut inner = self.inner.lock();
            inner.next_session += 1;
            inner.next_session
        };
        MemorySession {
            inner: Arc::clone(&self.inner),
            tracker: self.tracker.clone(),
            session,
        }
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    /// Makes every later insert of `record_type` fail.
    pub fn fail_inserts_of(&self, record_type: RecordType) {
        self.inner.lock().failing_inserts.insert(record_type);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing_inserts.clear();
        inner.fail_next_commit = false;
    }

    /// Makes the next physical commit fail; its writes are rolled back.
    pub fn fail_next_commit(&self) {
        self.inner.lock().fail_next_commit = true;
    }

    /// Rows currently visible for `record_type`, committed or not.
    pub fn row_count(&self, record_type: RecordType) -> usize {
        self.inner
            .lock()
            .tables
            .get(&record_type)
            .map_or(0, |table| table.rows.len())
    }

    pub fn contains(&self, record_type: RecordType, id: RecordId) -> bool {
        self.inner
            .lock()
            .tables
            .get(&record_type)
            .is_some_and(|table| table.rows.contains_key(&id))
    }

    pub fn open_transactions(&self) -> usize {
        self.inner.lock().open.len()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// One session on a `MemoryDatabase`; clones share the session binding.
#[derive(Debug, Clone)]
pub struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    tracker: TransactionTracker,
    session: SessionId,
}

impl MemorySession {
    /// Handle writes from this session currently go to.
    pub fn bound_handle(&self) -> Option<TxHandle> {
        self.inner.lock().bound.get(&self.session).copied()
    }
}

impl Store for MemorySession {
    fn insert(&self, record_type: RecordType, attrs: &Attributes) -> StoreResult<RecordId> {
        let mut inner = self.inner.lock();
        if inner.failing_inserts.contains(&record_type) {
            warn!("event=store_write module=store status=error backend=memory action=insert record_type={record_type} error_code=injected_failure");
            return Err(StoreError::Backend(format!(
                "insert into {record_type} rejected"
            )));
        }
        let writer = inner.writer(self.session, record_type)?;
        let table = inner.tables.entry(record_type).or_default();
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(id, attrs.clone());
        inner.lock_row(writer, record_type, id)?;
        inner.log_undo(writer, Undo::Inserted(record_type, id));
        debug!("event=store_write module=store status=ok backend=memory action=insert record_type={record_type} id={id}");
        Ok(id)
    }

    fn update(
        &self,
        record_type: RecordType,
        id: RecordId,
        attrs: &Attributes,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let writer = inner.writer(self.session, record_type)?;
        if !inner
            .tables
            .get(&record_type)
            .is_some_and(|table| table.rows.contains_key(&id))
        {
            return Err(StoreError::NotFound { record_type, id });
        }
        inner.lock_row(writer, record_type, id)?;
        let previous = inner
            .tables
            .get_mut(&record_type)
            .and_then(|table| table.rows.insert(id, attrs.clone()));
        if let Some(previous) = previous {
            inner.log_undo(writer, Undo::Replaced(record_type, id, previous));
        }
        debug!("event=store_write module=store status=ok backend=memory action=update record_type={record_type} id={id}");
        Ok(())
    }

    fn delete(&self, record_type: RecordType, id: RecordId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let writer = inner.writer(self.session, record_type)?;
        inner.lock_row(writer, record_type, id)?;
        let previous = inner
            .tables
            .get_mut(&record_type)
            .and_then(|table| table.rows.remove(&id))
            .ok_or(StoreError::NotFound { record_type, id })?;
        inner.log_undo(writer, Undo::Replaced(record_type, id, previous));
        debug!("event=store_write module=store status=ok backend=memory action=delete record_type={record_type} id={id}");
        Ok(())
    }

    fn load(&self, record_type: RecordType, id: RecordId) -> StoreResult<Attributes> {
        self.inner
            .lock()
            .tables
            .get(&record_type)
            .and_then(|table| table.rows.get(&id))
            .cloned()
            .ok_or(StoreError::NotFound { record_type, id })
    }

    fn link(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let bound = inner.bound.get(&self.session).copied();
        let row = (join.to_string(), owner, target);
        if inner.links.insert(row.clone()) {
            inner.log_undo(bound, Undo::Linked(row));
        }
        Ok(())
    }

    fn unlink(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let bound = inner.bound.get(&self.session).copied();
        let row = (join.to_string(), owner, target);
        if inner.links.remove(&row) {
            inner.log_undo(bound, Undo::Unlinked(row));
        }
        Ok(())
    }

    fn linked(&self, join: &str, owner: RecordId) -> StoreResult<Vec<RecordId>> {
        Ok(self
            .inner
            .lock()
            .links
            .iter()
            .filter(|(name, from, _)| name == join && *from == owner)
            .map(|(_, _, target)| *target)
            .collect())
    }

    fn count(&self, record_type: RecordType) -> StoreResult<usize> {
        Ok(self
            .inner
            .lock()
            .tables
            .get(&record_type)
            .map_or(0, |table| table.rows.len()))
    }
}

impl Connection for MemorySession {
    fn begin(&self, definition: &TransactionDefinition) -> ConnectionResult<TxHandle> {
        let mut inner = self.inner.lock();
        if let Some(current) = inner.bound.get(&self.session) {
            return Err(ConnectionError::Busy(format!(
                "session already bound to {current}"
            )));
        }
        inner.next_handle += 1;
        let handle = TxHandle(inner.next_handle);
        inner.open.insert(
            handle,
            OpenTransaction {
                session: self.session,
                read_only: definition.read_only,
                undo: Vec::new(),
                locks: HashSet::new(),
                savepoints: Vec::new(),
            },
        );
        inner.bound.insert(self.session, handle);
        self.tracker.record(TransactionEvent::Begin, handle.0);
        Ok(handle)
    }

    fn commit(&self, handle: TxHandle) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        let open = inner.close(handle)?;
        if std::mem::take(&mut inner.fail_next_commit) {
            inner.apply_undo(open.undo.into_iter());
            self.tracker.record(TransactionEvent::Rollback, handle.0);
            return Err(ConnectionError::Failure(format!("commit of {handle} failed")));
        }
        self.tracker.record(TransactionEvent::Commit, handle.0);
        Ok(())
    }

    fn rollback(&self, handle: TxHandle) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        let open = inner.close(handle)?;
        inner.apply_undo(open.undo.into_iter());
        self.tracker.record(TransactionEvent::Rollback, handle.0);
        Ok(())
    }

    fn savepoint(&self, handle: TxHandle) -> ConnectionResult<SavepointMarker> {
        let mut inner = self.inner.lock();
        if !inner.savepoints {
            return Err(ConnectionError::SavepointsUnsupported);
        }
        inner.next_marker += 1;
        let marker = SavepointMarker(inner.next_marker);
        let open = inner
            .open
            .get_mut(&handle)
            .ok_or(ConnectionError::UnknownHandle(handle))?;
        let mark = open.undo.len();
        open.savepoints.push((marker, mark));
        self.tracker.record(TransactionEvent::Savepoint, handle.0);
        Ok(marker)
    }

    fn rollback_to(&self, handle: TxHandle, marker: SavepointMarker) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        let open = inner
            .open
            .get_mut(&handle)
            .ok_or(ConnectionError::UnknownHandle(handle))?;
        let position = open
            .savepoints
            .iter()
            .position(|(placed, _)| *placed == marker)
            .ok_or(ConnectionError::UnknownSavepoint { handle, marker })?;
        let mark = open.savepoints[position].1;
        open.savepoints.truncate(position + 1);
        let undone: Vec<Undo> = open.undo.drain(mark..).collect();
        inner.apply_undo(undone.into_iter());
        self.tracker
            .record(TransactionEvent::RollbackToSavepoint, handle.0);
        Ok(())
    }

    fn release_savepoint(&self, handle: TxHandle, marker: SavepointMarker) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        let open = inner
            .open
            .get_mut(&handle)
            .ok_or(ConnectionError::UnknownHandle(handle))?;
        let position = open
            .savepoints
            .iter()
            .position(|(placed, _)| *placed == marker)
            .ok_or(ConnectionError::UnknownSavepoint { handle, marker })?;
        open.savepoints.truncate(position);
        self.tracker.record(TransactionEvent::ReleaseSavepoint, handle.0);
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        self.inner.lock().savepoints
    }

    fn suspend(&self, handle: TxHandle) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if inner.bound.get(&self.session) == Some(&handle) {
            inner.bound.remove(&self.session);
        }
        Ok(())
    }

    fn resume(&self, handle: TxHandle) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if !inner.open.contains_key(&handle) {
            return Err(ConnectionError::UnknownHandle(handle));
        }
        inner.bound.insert(self.session, handle);
        Ok(())
    }
}
