//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist records as JSON attribute rows in the generic `records` table.
//! - Persist many-to-many associations in `record_links`.
//! - Map physical transactions and savepoints onto SQLite statements.
//!
//! # Invariants
//! - One SQLite connection carries at most one physical transaction; a
//!   second `begin` while one is open or suspended is `ConnectionError::Busy`.
//! - While a transaction is suspended, writes are rejected rather than
//!   silently joining it. Reads stay allowed.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::record::{Attributes, RecordId};
use crate::model::schema::RecordType;
use crate::store::{Store, StoreError, StoreResult};
use crate::tx::{
    Connection, ConnectionError, ConnectionResult, SavepointMarker, TransactionDefinition,
    TxHandle,
};
use log::{debug, warn};
use rusqlite::{params, OptionalExtension};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Default)]
struct TxState {
    open: Option<TxHandle>,
    suspended: bool,
    read_only: bool,
    next_handle: u64,
    next_marker: u64,
}

#[derive(Debug)]
struct Shared {
    conn: rusqlite::Connection,
    state: RefCell<TxState>,
}

/// Record store over one SQLite connection; clones share the connection.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    shared: Rc<Shared>,
}

impl SqliteDatabase {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            shared: Rc::new(Shared {
                conn,
                state: RefCell::new(TxState::default()),
            }),
        }
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.shared.conn
    }

    pub fn in_transaction(&self) -> bool {
        self.shared.state.borrow().open.is_some()
    }

    fn ensure_writable(&self, record_type: RecordType) -> StoreResult<()> {
        let state = self.shared.state.borrow();
        if state.open.is_some() && state.suspended {
            return Err(StoreError::Backend(format!(
                "write to {record_type} while the sqlite transaction is suspended"
            )));
        }
        if state.open.is_some() && state.read_only {
            return Err(StoreError::ReadOnly { record_type });
        }
        Ok(())
    }

    fn execute_control(&self, sql: &str) -> ConnectionResult<()> {
        self.shared
            .conn
            .execute_batch(sql)
            .map_err(|err| ConnectionError::Failure(err.to_string()))
    }

    fn check_open(&self, handle: TxHandle) -> ConnectionResult<()> {
        if self.shared.state.borrow().open == Some(handle) {
            Ok(())
        } else {
            Err(ConnectionError::UnknownHandle(handle))
        }
    }

    fn finish(&self, handle: TxHandle, sql: &str) -> ConnectionResult<()> {
        self.check_open(handle)?;
        let result = self.execute_control(sql);
        let read_only = {
            let mut state = self.shared.state.borrow_mut();
            let read_only = state.read_only;
            state.open = None;
            state.suspended = false;
            state.read_only = false;
            read_only
        };
        if read_only {
            self.execute_control("PRAGMA query_only = OFF;")?;
        }
        result
    }
}

fn savepoint_name(marker: SavepointMarker) -> String {
    format!("sp_{}", marker.0)
}

impl Store for SqliteDatabase {
    fn insert(&self, record_type: RecordType, attrs: &Attributes) -> StoreResult<RecordId> {
        self.ensure_writable(record_type)?;
        let json = serde_json::to_string(attrs)?;
        self.shared.conn.execute(
            "INSERT INTO records (record_type, attrs) VALUES (?1, ?2);",
            params![record_type.name(), json],
        )?;
        let id = self.shared.conn.last_insert_rowid();
        debug!("event=store_write module=store status=ok backend=sqlite action=insert record_type={record_type} id={id}");
        Ok(id)
    }

    fn update(
        &self,
        record_type: RecordType,
        id: RecordId,
        attrs: &Attributes,
    ) -> StoreResult<()> {
        self.ensure_writable(record_type)?;
        let json = serde_json::to_string(attrs)?;
        let changed = self.shared.conn.execute(
            "UPDATE records
             SET attrs = ?3, updated_at = strftime('%s', 'now')
             WHERE record_type = ?1 AND id = ?2;",
            params![record_type.name(), id, json],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { record_type, id });
        }
        debug!("event=store_write module=store status=ok backend=sqlite action=update record_type={record_type} id={id}");
        Ok(())
    }

    fn delete(&self, record_type: RecordType, id: RecordId) -> StoreResult<()> {
        self.ensure_writable(record_type)?;
        let changed = self.shared.conn.execute(
            "DELETE FROM records WHERE record_type = ?1 AND id = ?2;",
            params![record_type.name(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { record_type, id });
        }
        debug!("event=store_write module=store status=ok backend=sqlite action=delete record_type={record_type} id={id}");
        Ok(())
    }

    fn load(&self, record_type: RecordType, id: RecordId) -> StoreResult<Attributes> {
        let json: Option<String> = self
            .shared
            .conn
            .query_row(
                "SELECT attrs FROM records WHERE record_type = ?1 AND id = ?2;",
                params![record_type.name(), id],
                |row| row.get(0),
            )
            .optional()?;
        let json = json.ok_or(StoreError::NotFound { record_type, id })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn link(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()> {
        self.shared.conn.execute(
            "INSERT OR IGNORE INTO record_links (join_name, owner_id, target_id)
             VALUES (?1, ?2, ?3);",
            params![join, owner, target],
        )?;
        Ok(())
    }

    fn unlink(&self, join: &str, owner: RecordId, target: RecordId) -> StoreResult<()> {
        self.shared.conn.execute(
            "DELETE FROM record_links
             WHERE join_name = ?1 AND owner_id = ?2 AND target_id = ?3;",
            params![join, owner, target],
        )?;
        Ok(())
    }

    fn linked(&self, join: &str, owner: RecordId) -> StoreResult<Vec<RecordId>> {
        let mut stmt = self.shared.conn.prepare(
            "SELECT target_id FROM record_links
             WHERE join_name = ?1 AND owner_id = ?2
             ORDER BY target_id ASC;",
        )?;
        let rows = stmt.query_map(params![join, owner], |row| row.get::<_, RecordId>(0))?;
        let mut targets = Vec::new();
        for row in rows {
            targets.push(row?);
        }
        Ok(targets)
    }

    fn count(&self, record_type: RecordType) -> StoreResult<usize> {
        let count: i64 = self.shared.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE record_type = ?1;",
            [record_type.name()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl Connection for SqliteDatabase {
    fn begin(&self, definition: &TransactionDefinition) -> ConnectionResult<TxHandle> {
        if let Some(open) = self.shared.state.borrow().open {
            return Err(ConnectionError::Busy(format!(
                "sqlite connection already carries {open}"
            )));
        }
        if definition.read_only {
            self.execute_control("PRAGMA query_only = ON; BEGIN DEFERRED;")?;
        } else {
            self.execute_control("BEGIN IMMEDIATE;")?;
        }
        let mut state = self.shared.state.borrow_mut();
        state.next_handle += 1;
        let handle = TxHandle(state.next_handle);
        state.open = Some(handle);
        state.read_only = definition.read_only;
        debug!(
            "event=tx_physical_begin module=store status=ok backend=sqlite handle={handle} isolation={}",
            definition.isolation
        );
        Ok(handle)
    }

    fn commit(&self, handle: TxHandle) -> ConnectionResult<()> {
        match self.finish(handle, "COMMIT;") {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("event=tx_physical_commit module=store status=error backend=sqlite handle={handle} error={err}");
                let _ = self.shared.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    fn rollback(&self, handle: TxHandle) -> ConnectionResult<()> {
        self.finish(handle, "ROLLBACK;")
    }

    fn savepoint(&self, handle: TxHandle) -> ConnectionResult<SavepointMarker> {
        self.check_open(handle)?;
        let marker = {
            let mut state = self.shared.state.borrow_mut();
            state.next_marker += 1;
            SavepointMarker(state.next_marker)
        };
        self.execute_control(&format!("SAVEPOINT {};", savepoint_name(marker)))?;
        Ok(marker)
    }

    fn rollback_to(&self, handle: TxHandle, marker: SavepointMarker) -> ConnectionResult<()> {
        self.check_open(handle)?;
        self.execute_control(&format!("ROLLBACK TO {};", savepoint_name(marker)))
    }

    fn release_savepoint(&self, handle: TxHandle, marker: SavepointMarker) -> ConnectionResult<()> {
        self.check_open(handle)?;
        self.execute_control(&format!("RELEASE {};", savepoint_name(marker)))
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    fn suspend(&self, handle: TxHandle) -> ConnectionResult<()> {
        self.check_open(handle)?;
        self.shared.state.borrow_mut().suspended = true;
        Ok(())
    }

    fn resume(&self, handle: TxHandle) -> ConnectionResult<()> {
        self.check_open(handle)?;
        self.shared.state.borrow_mut().suspended = false;
        Ok(())
    }
}
