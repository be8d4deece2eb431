//! Store entry point: connection, catalog, hook table and exception sink.
//!
//! # Invariants
//! - Cascade rules are validated against the catalog before the store is usable.
//! - Cascade checks are registered ahead of custom pre-run hooks for the same key.

use crate::config::StoreConfig;
use crate::context::RequestContext;
use crate::db::{open_db_in_memory, open_db_with_config};
use crate::error::ApiResult;
use crate::hooks::{HookContext, HookRegistry, HookVerb};
use crate::model::filter::Filter;
use crate::repo::catalog::ResourceCatalog;
use crate::repo::resource_accessor::{Passthrough, ResourceAccessor, SqliteResourceAccessor};
use crate::repo::scope::CredentialScope;
use crate::service::cascade_delete::{register_cascade_rules, CascadeRule};
use crate::sink::{ExceptionSink, LogExceptionSink};
use crate::transaction::TransactionManager;
use rusqlite::{Connection, Transaction};
use std::sync::Arc;

/// Migrated connection plus everything accessors need.
pub struct Store {
    conn: Connection,
    catalog: ResourceCatalog,
    hooks: HookRegistry,
}

impl Store {
    /// Starts building a store on an already migrated connection.
    pub fn builder(conn: Connection) -> StoreBuilder {
        StoreBuilder::new(conn)
    }

    /// In-memory store with the default cascades and the log sink.
    pub fn open_in_memory() -> ApiResult<Self> {
        Self::builder(open_db_in_memory()?).build()
    }

    /// Store described by `config`.
    pub fn open(config: &StoreConfig) -> ApiResult<Self> {
        let conn = open_db_with_config(&config.database)?;
        Self::builder(conn)
            .with_cascade_rules(config.effective_cascades())
            .build()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn transaction_manager(&self) -> TransactionManager<'_> {
        TransactionManager::new(&self.conn)
    }

    /// Accessor bound to `passthrough`'s scope and transaction.
    pub fn accessor<'a>(
        &'a self,
        request: &'a RequestContext,
        passthrough: Passthrough<'a>,
    ) -> SqliteResourceAccessor<'a> {
        SqliteResourceAccessor::new(
            &self.conn,
            &self.catalog,
            &self.hooks,
            request,
            CredentialScope::Root,
        )
        .with_passthrough(passthrough)
    }

    /// Runs `op` in a transaction on this store's connection.
    pub fn run_in_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<rusqlite::Error> + std::fmt::Display,
    {
        self.transaction_manager().run_in_transaction(op)
    }

    /// Deletes `resource` rows matching `filter`, with cascades, in one transaction.
    pub fn delete_in_transaction(
        &self,
        request: &RequestContext,
        scope: CredentialScope,
        resource: &str,
        filter: &Filter,
    ) -> ApiResult<()> {
        self.run_in_transaction(|tx| {
            self.accessor(request, Passthrough::new(scope, Some(tx)))
                .delete(resource, filter)
        })
    }
}

/// Builder for `Store`.
pub struct StoreBuilder {
    conn: Connection,
    cascades: Vec<CascadeRule>,
    sink: Arc<dyn ExceptionSink>,
    hooks: HookRegistry,
}

impl StoreBuilder {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            cascades: CascadeRule::fleet_defaults(),
            sink: Arc::new(LogExceptionSink),
            hooks: HookRegistry::new(),
        }
    }

    /// Replaces the default cascade rules.
    pub fn with_cascade_rules(mut self, rules: Vec<CascadeRule>) -> Self {
        self.cascades = rules;
        self
    }

    pub fn with_exception_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a custom pre-run hook, run after any cascade check on the same key.
    pub fn with_pre_run_hook<F>(
        mut self,
        verb: HookVerb,
        namespace: &str,
        resource: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(&HookContext<'_>) -> ApiResult<()> + Send + Sync + 'static,
    {
        self.hooks
            .register_pre_run_hook(verb, namespace, resource, handler);
        self
    }

    /// Introspects the catalog, validates cascades and wires the hook table.
    pub fn build(self) -> ApiResult<Store> {
        let catalog = ResourceCatalog::fleet_default(&self.conn)?;
        for rule in &self.cascades {
            rule.validate(&catalog)?;
        }

        let mut hooks = HookRegistry::new();
        register_cascade_rules(&mut hooks, &self.cascades, self.sink);
        hooks.extend(self.hooks);

        Ok(Store {
            conn: self.conn,
            catalog,
            hooks,
        })
    }
}
