//! Data shapes shared by the query builders and the accessor.
//!
//! # Responsibility
//! - Define the flat record type used for criteria, write data and rows.
//!
//! # Invariants
//! - Records only hold scalar values.

pub mod record;
