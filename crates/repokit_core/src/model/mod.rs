//! Data shapes shared across the persistence layer.
//!
//! # Invariants
//! - Row shape is owned by the backing table, never by this crate.

pub mod record;
