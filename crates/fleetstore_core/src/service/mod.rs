//! Store services built on the resource accessor.
//!
//! # Responsibility
//! - Idempotent row creation (`upsert`).
//! - Dependent cleanup before deletes (`cascade_delete`).

pub mod cascade_delete;
pub mod upsert;
