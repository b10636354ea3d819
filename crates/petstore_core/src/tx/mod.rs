//! Transaction boundaries with propagation semantics.
//!
//! # Responsibility
//! - Define transaction attributes (`TransactionDefinition`).
//! - Abstract the physical transaction API (`Connection`).
//! - Manage nested scopes over one connection (`TransactionManager`).
//!
//! # Invariants
//! - Nested scopes always resolve before the scope they were opened in.
//! - Read-only, isolation and timeout are hints handed to the connection;
//!   only the deadline is enforced here, cooperatively.

pub mod clock;
pub mod connection;
pub mod context;
pub mod definition;
pub mod manager;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{Connection, ConnectionError, ConnectionResult, SavepointMarker, TxHandle};
pub use context::{ContextRelation, JournalEntry, ScopeId, TransactionContext, TransactionStatus};
pub use definition::{Isolation, Propagation, TransactionDefinition};
pub use manager::{TransactionError, TransactionManager, TxResult};
pub use tracker::{TransactionEvent, TransactionRecord, TransactionTracker};
