//! Core resource store for the fleet and auth data model.
//!
//! Accessors, hook dispatch, upsert primitives and cascading deletes share one
//! SQLite connection owned by `Store`.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sink;
pub mod store;
pub mod transaction;

pub use config::{ConfigError, ConfigResult, DatabaseConfig, LoggingConfig, StoreConfig};
pub use context::{current_affected_ids, ActorId, AffectedIds, RequestContext};
pub use db::{DbError, DbResult};
pub use error::{ApiError, ApiResult};
pub use hooks::{HookContext, HookRegistry, HookVerb, PreRunHook};
pub use logging::init_logging;
pub use model::filter::{Filter, Predicate};
pub use model::record::{record_from_json, Record, RecordId, ID_FIELD};
pub use repo::catalog::{ResourceCatalog, ResourceDef, NAMESPACE_AUTH, NAMESPACE_FLEET};
pub use repo::resource_accessor::{
    Passthrough, PostOptions, PostResult, ResourceAccessor, SqliteResourceAccessor,
};
pub use repo::scope::{parse_credential_scope, CredentialScope, CredentialScopeError};
pub use service::cascade_delete::{
    cascade_delete, register_cascade_delete, register_cascade_rules, CascadeRule, DependentSpec,
    SubDependentSpec,
};
pub use service::upsert::{
    get_or_insert_id, get_or_insert_id_auth, get_or_insert_id_model, update_or_insert,
    update_or_insert_auth, update_or_insert_model, UpsertResult,
};
pub use sink::{
    CaptureMetadata, CapturedException, ExceptionSink, LogExceptionSink, RecordingExceptionSink,
};
pub use store::{Store, StoreBuilder};
pub use transaction::{wrap_in_transaction, TransactionManager};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
