//! Record and filter shapes exchanged with the resource store.
//!
//! # Invariants
//! - Every persisted record carries an integer `id`.
//! - Filters are deterministic: field order never changes rendering or cache keys.

pub mod filter;
pub mod record;
