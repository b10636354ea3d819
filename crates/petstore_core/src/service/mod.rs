//! Persistence use-case layer.
//!
//! # Responsibility
//! - Tie the cascade engine, the store and the transaction manager together
//!   behind `UnitOfWork`.
//! - Keep callers independent of which store backs the unit of work.

pub mod error;
pub mod unit_of_work;

pub use error::{PersistError, PersistResult, PersistStage};
pub use unit_of_work::{ExecutionReport, UnitOfWork};
