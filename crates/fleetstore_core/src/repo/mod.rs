//! Resource access layer.
//!
//! # Responsibility
//! - Describe the resources a store exposes and the scopes that may reach them.
//! - Isolate SQL rendering from hook and service orchestration.
//!
//! # Invariants
//! - Every accessor call is checked against its credential scope first.
//! - SQL identifiers come from the introspected catalog only.

pub mod catalog;
pub mod resource_accessor;
pub mod scope;
