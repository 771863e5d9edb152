//! Repository layer abstractions.
//!
//! # Responsibility
//! - Define the generic table-scoped data access contract.
//! - Isolate SQL assembly from concrete repositories and their callers.
//!
//! # Invariants
//! - Repositories hold no state beyond a table name and the shared handle.
//! - Repository APIs return DB transport errors untouched.

pub mod base;
pub mod query;

pub use base::{RepoError, RepoResult, Repository, TableRepository};
pub use query::{is_valid_identifier, FieldCriterion, Operator, SortDirection};
