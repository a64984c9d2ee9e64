//! Table access layer.
//!
//! # Responsibility
//! - Define the contract a concrete table type implements (`TableBinding`).
//! - Provide the generic CRUD helpers built on that contract.
//!
//! # Invariants
//! - Operations return semantic errors (`NotFound`, `Ambiguous`) distinct from
//!   driver transport errors.

pub mod accessor;
