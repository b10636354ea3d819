//! Record graph model.
//!
//! # Responsibility
//! - Define the static relationship schema and its cascade policy.
//! - Hold the mutable record arena a unit of work operates on.
//!
//! # Invariants
//! - Schemas are validated before use and never mutated afterwards.
//! - Record identity is assigned by the store, never by callers.

pub mod petstore;
pub mod record;
pub mod schema;
