//! Resource accessor contract and SQLite implementation.
//!
//! # Responsibility
//! - Expose `get/post/patch/delete` over catalog resources with filters.
//! - Gate every call on the bound credential scope.
//! - Run registered pre-run hooks before the store executes a request.
//!
//! # Invariants
//! - Only catalog-validated identifiers are interpolated into SQL; every value
//!   is bound as a parameter.
//! - A handle bound to a transaction cannot outlive it.
//! - A delete on an autocommit handle opens its own transaction, so its
//!   cascade hooks commit or roll back together with the primary delete.

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{HookContext, HookRegistry, HookVerb};
use crate::model::filter::{Filter, Predicate};
use crate::model::record::{json_to_sql, sql_to_json, Record, RecordId, ID_FIELD};
use crate::repo::catalog::{ResourceCatalog, ResourceDef};
use crate::repo::scope::CredentialScope;
use crate::transaction::TransactionManager;
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Transaction};

/// Options for `post`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// Return the stored row instead of only its id.
    pub return_resource: bool,
}

/// Result of `post`.
#[derive(Debug, Clone, PartialEq)]
pub enum PostResult {
    Id(RecordId),
    Resource(Record),
}

impl PostResult {
    /// Id of the inserted row, whichever shape was returned.
    pub fn id(&self) -> Option<RecordId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Resource(record) => crate::model::record::record_id(record),
        }
    }
}

/// Scope and transaction to bind to a cloned accessor.
#[derive(Clone, Copy)]
pub struct Passthrough<'a> {
    pub scope: CredentialScope,
    pub tx: Option<&'a Transaction<'a>>,
}

impl<'a> Passthrough<'a> {
    pub fn new(scope: CredentialScope, tx: Option<&'a Transaction<'a>>) -> Self {
        Self { scope, tx }
    }

    /// Scope only, autocommit.
    pub fn scope(scope: CredentialScope) -> Self {
        Self { scope, tx: None }
    }
}

/// Capability-typed handle on the resource store.
pub trait ResourceAccessor {
    fn scope(&self) -> CredentialScope;
    fn in_transaction(&self) -> bool;
    fn request(&self) -> &RequestContext;
    fn get(&self, resource: &str, filter: &Filter, select: Option<&[&str]>)
        -> ApiResult<Vec<Record>>;
    fn post(&self, resource: &str, body: &Record, options: PostOptions) -> ApiResult<PostResult>;
    fn patch(&self, resource: &str, id: RecordId, body: &Record) -> ApiResult<()>;
    fn delete(&self, resource: &str, filter: &Filter) -> ApiResult<()>;
}

/// SQLite-backed resource accessor.
#[derive(Clone, Copy)]
pub struct SqliteResourceAccessor<'a> {
    conn: &'a Connection,
    in_transaction: bool,
    scope: CredentialScope,
    catalog: &'a ResourceCatalog,
    hooks: &'a HookRegistry,
    request: &'a RequestContext,
}

impl<'a> SqliteResourceAccessor<'a> {
    /// Creates an autocommit accessor on `conn`.
    pub fn new(
        conn: &'a Connection,
        catalog: &'a ResourceCatalog,
        hooks: &'a HookRegistry,
        request: &'a RequestContext,
        scope: CredentialScope,
    ) -> Self {
        Self {
            conn,
            in_transaction: false,
            scope,
            catalog,
            hooks,
            request,
        }
    }

    /// Clones this accessor with another scope and transaction binding.
    ///
    /// Without a transaction the clone keeps this accessor's connection.
    pub fn with_passthrough<'b>(&self, passthrough: Passthrough<'b>) -> SqliteResourceAccessor<'b>
    where
        'a: 'b,
    {
        let (conn, in_transaction): (&'b Connection, bool) = match passthrough.tx {
            Some(tx) => (&**tx, true),
            None => (self.conn, false),
        };
        SqliteResourceAccessor {
            conn,
            in_transaction,
            scope: passthrough.scope,
            catalog: self.catalog,
            hooks: self.hooks,
            request: self.request,
        }
    }

    fn authorize(&self, resource: &str) -> ApiResult<&'a ResourceDef> {
        let def = self.catalog.resolve(resource)?;
        if !self.scope.permits(def.namespace()) {
            return Err(ApiError::ScopeDenied {
                scope: self.scope,
                resource: resource.to_string(),
            });
        }
        Ok(def)
    }

    fn run_hooks(
        &self,
        verb: HookVerb,
        def: &ResourceDef,
        filter: &Filter,
        body: Option<&Record>,
    ) -> ApiResult<()> {
        self.hooks.run_pre_run_hooks(&HookContext {
            verb,
            namespace: def.namespace(),
            resource: def.name(),
            filter,
            body,
            request: self.request,
            accessor: self,
        })
    }

    fn fetch(
        &self,
        def: &ResourceDef,
        filter: &Filter,
        select: Option<&[&str]>,
    ) -> ApiResult<Vec<Record>> {
        let columns = match select {
            Some(fields) if !fields.is_empty() => {
                let mut quoted = Vec::with_capacity(fields.len());
                for field in fields {
                    def.require_column(field)?;
                    quoted.push(format!("\"{field}\""));
                }
                quoted.join(", ")
            }
            _ => "*".to_string(),
        };
        let (where_sql, binds) = render_where(def, filter)?;
        let sql = format!(
            "SELECT {columns} FROM \"{}\"{where_sql} ORDER BY \"{ID_FIELD}\" ASC;",
            def.name()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (index, name) in names.iter().enumerate() {
                record.insert(name.clone(), sql_to_json(row.get_ref(index)?));
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl ResourceAccessor for SqliteResourceAccessor<'_> {
    fn scope(&self) -> CredentialScope {
        self.scope
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn request(&self) -> &RequestContext {
        self.request
    }

    fn get(
        &self,
        resource: &str,
        filter: &Filter,
        select: Option<&[&str]>,
    ) -> ApiResult<Vec<Record>> {
        let def = self.authorize(resource)?;
        self.run_hooks(HookVerb::Get, def, filter, None)?;
        self.fetch(def, filter, select)
    }

    fn post(&self, resource: &str, body: &Record, options: PostOptions) -> ApiResult<PostResult> {
        let def = self.authorize(resource)?;
        let mut columns = Vec::with_capacity(body.len());
        let mut binds = Vec::with_capacity(body.len());
        for (field, value) in body {
            def.require_column(field)?;
            columns.push(format!("\"{field}\""));
            binds.push(json_to_sql(field, value)?);
        }
        self.run_hooks(HookVerb::Post, def, &Filter::new(), Some(body))?;

        let sql = if columns.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES;", def.name())
        } else {
            let placeholders = (1..=binds.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({placeholders});",
                def.name(),
                columns.join(", ")
            )
        };
        self.conn.execute(&sql, params_from_iter(binds))?;
        let id = self.conn.last_insert_rowid();
        debug!(
            "event=resource_post module=repo status=ok resource={} id={} request_id={}",
            def.name(),
            id,
            self.request.request_id()
        );

        if !options.return_resource {
            return Ok(PostResult::Id(id));
        }
        match self.fetch(def, &Filter::id_in(&[id]), None)?.into_iter().next() {
            Some(record) => Ok(PostResult::Resource(record)),
            None => Err(ApiError::NotFound {
                resource: def.name().to_string(),
                id,
            }),
        }
    }

    fn patch(&self, resource: &str, id: RecordId, body: &Record) -> ApiResult<()> {
        let def = self.authorize(resource)?;
        let mut assignments = Vec::with_capacity(body.len());
        let mut binds = Vec::with_capacity(body.len() + 1);
        for (field, value) in body {
            def.require_column(field)?;
            if field == ID_FIELD {
                return Err(ApiError::InvalidValue {
                    field: field.clone(),
                    message: "primary key cannot be patched".to_string(),
                });
            }
            binds.push(json_to_sql(field, value)?);
            assignments.push(format!("\"{field}\" = ?{}", binds.len()));
        }
        let target = Filter::id_in(&[id]);
        self.run_hooks(HookVerb::Patch, def, &target, Some(body))?;

        let changed = if assignments.is_empty() {
            let exists: i64 = self.conn.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE \"{ID_FIELD}\" = ?1);",
                    def.name()
                ),
                [id],
                |row| row.get(0),
            )?;
            usize::try_from(exists).unwrap_or(0)
        } else {
            binds.push(SqlValue::Integer(id));
            let sql = format!(
                "UPDATE \"{}\" SET {} WHERE \"{ID_FIELD}\" = ?{};",
                def.name(),
                assignments.join(", "),
                binds.len()
            );
            self.conn.execute(&sql, params_from_iter(binds))?
        };

        if changed == 0 {
            return Err(ApiError::NotFound {
                resource: def.name().to_string(),
                id,
            });
        }
        Ok(())
    }

    fn delete(&self, resource: &str, filter: &Filter) -> ApiResult<()> {
        let def = self.authorize(resource)?;
        let (where_sql, binds) = render_where(def, filter)?;
        if !self.in_transaction && self.conn.is_autocommit() {
            return TransactionManager::new(self.conn).run_in_transaction(|tx| {
                self.with_passthrough(Passthrough::new(self.scope, Some(tx)))
                    .delete(resource, filter)
            });
        }
        self.run_hooks(HookVerb::Delete, def, filter, None)?;

        let deleted = self.conn.execute(
            &format!("DELETE FROM \"{}\"{where_sql};", def.name()),
            params_from_iter(binds),
        )?;
        debug!(
            "event=resource_delete module=repo status=ok resource={} rows={} in_transaction={} request_id={}",
            def.name(),
            deleted,
            self.in_transaction,
            self.request.request_id()
        );
        Ok(())
    }
}

fn render_where(def: &ResourceDef, filter: &Filter) -> ApiResult<(String, Vec<SqlValue>)> {
    if filter.is_empty() {
        return Ok((String::new(), Vec::new()));
    }

    let mut clauses = Vec::with_capacity(filter.len());
    let mut binds = Vec::new();
    for (field, predicate) in filter.iter() {
        def.require_column(field)?;
        match predicate {
            Predicate::Eq(value) if value.is_null() => {
                clauses.push(format!("\"{field}\" IS NULL"));
            }
            Predicate::Eq(value) => {
                binds.push(json_to_sql(field, value)?);
                clauses.push(format!("\"{field}\" = ?{}", binds.len()));
            }
            Predicate::In(values) if values.is_empty() => {
                clauses.push("0 = 1".to_string());
            }
            Predicate::In(values) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    binds.push(json_to_sql(field, value)?);
                    placeholders.push(format!("?{}", binds.len()));
                }
                clauses.push(format!("\"{field}\" IN ({})", placeholders.join(", ")));
            }
        }
    }
    Ok((format!(" WHERE {}", clauses.join(" AND ")), binds))
}
