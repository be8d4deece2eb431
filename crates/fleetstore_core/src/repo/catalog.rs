//! Resource catalog: the names the accessor is allowed to turn into SQL.
//!
//! # Invariants
//! - Every resource and column name is a lowercase identifier.
//! - Every resource has an `id` column.
//! - Columns are introspected from the migrated schema, never declared by hand.

use crate::error::{ApiError, ApiResult};
use crate::model::record::ID_FIELD;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Namespace of auth resources.
pub const NAMESPACE_AUTH: &str = "auth";
/// Namespace of fleet model resources.
pub const NAMESPACE_FLEET: &str = "fleet";

/// Fleet model tables created by migration 1.
pub const FLEET_RESOURCES: &[&str] = &[
    "application",
    "application_config_variable",
    "application_environment_variable",
    "device",
    "device_config_variable",
    "device_environment_variable",
    "device_tag",
    "image",
    "image_install",
];

/// Auth tables created by migration 2.
pub const AUTH_RESOURCES: &[&str] = &[
    "actor",
    "api_key",
    "api_key__has__permission",
    "permission",
    "user",
];

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier regex must compile")
});

/// Returns whether `value` is safe to interpolate as a quoted SQL identifier.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// One known resource and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDef {
    name: String,
    namespace: String,
    columns: BTreeSet<String>,
}

impl ResourceDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Fails with `UnknownField` unless `field` is a column.
    pub fn require_column(&self, field: &str) -> ApiResult<()> {
        if self.has_column(field) {
            return Ok(());
        }
        Err(ApiError::UnknownField {
            resource: self.name.clone(),
            field: field.to_string(),
        })
    }
}

/// Set of resources reachable through resource accessors.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: BTreeMap<String, ResourceDef>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the fleet and auth namespaces of a migrated connection.
    pub fn fleet_default(conn: &Connection) -> ApiResult<Self> {
        let mut catalog = Self::new();
        catalog.introspect(conn, NAMESPACE_FLEET, FLEET_RESOURCES)?;
        catalog.introspect(conn, NAMESPACE_AUTH, AUTH_RESOURCES)?;
        Ok(catalog)
    }

    /// Registers `tables` under `namespace`, reading their columns from `conn`.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for malformed namespace, table or column names.
    /// - `UnknownResource` when a table is missing or already registered.
    /// - `UnknownField` when a table has no `id` column.
    pub fn introspect(
        &mut self,
        conn: &Connection,
        namespace: &str,
        tables: &[&str],
    ) -> ApiResult<()> {
        if !is_valid_identifier(namespace) {
            return Err(ApiError::InvalidIdentifier(namespace.to_string()));
        }

        for table in tables {
            if !is_valid_identifier(table) {
                return Err(ApiError::InvalidIdentifier((*table).to_string()));
            }
            if self.resources.contains_key(*table) || !table_exists(conn, table)? {
                return Err(ApiError::UnknownResource((*table).to_string()));
            }

            let columns = table_columns(conn, table)?;
            if let Some(invalid) = columns.iter().find(|column| !is_valid_identifier(column)) {
                return Err(ApiError::InvalidIdentifier(invalid.clone()));
            }
            if !columns.contains(ID_FIELD) {
                return Err(ApiError::UnknownField {
                    resource: (*table).to_string(),
                    field: ID_FIELD.to_string(),
                });
            }

            self.resources.insert(
                (*table).to_string(),
                ResourceDef {
                    name: (*table).to_string(),
                    namespace: namespace.to_string(),
                    columns,
                },
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceDef> {
        self.resources.get(resource)
    }

    /// Looks up a resource or fails with `UnknownResource`.
    pub fn resolve(&self, resource: &str) -> ApiResult<&ResourceDef> {
        self.get(resource)
            .ok_or_else(|| ApiError::UnknownResource(resource.to_string()))
    }

    /// Resource names of one namespace, sorted.
    pub fn resources_in(&self, namespace: &str) -> Vec<&str> {
        self.resources
            .values()
            .filter(|def| def.namespace == namespace)
            .map(|def| def.name.as_str())
            .collect()
    }
}

fn table_exists(conn: &Connection, table: &str) -> ApiResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> ApiResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let mut rows = stmt.query([])?;
    let mut columns = BTreeSet::new();
    while let Some(row) = rows.next()? {
        columns.insert(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_identifier, ResourceCatalog, NAMESPACE_AUTH, NAMESPACE_FLEET};
    use crate::db::open_db_in_memory;
    use crate::error::ApiError;

    #[test]
    fn identifiers_must_be_lowercase_words() {
        assert!(is_valid_identifier("device_config_variable"));
        assert!(is_valid_identifier("api_key__has__permission"));
        assert!(!is_valid_identifier("Device"));
        assert!(!is_valid_identifier("device; DROP TABLE device"));
        assert!(!is_valid_identifier("\"id\""));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn fleet_default_covers_both_namespaces() {
        let conn = open_db_in_memory().expect("in-memory db");
        let catalog = ResourceCatalog::fleet_default(&conn).expect("catalog");

        let device = catalog.resolve("device").expect("device resource");
        assert_eq!(device.namespace(), NAMESPACE_FLEET);
        assert!(device.has_column("application_id"));
        assert_eq!(
            catalog.resolve("permission").expect("permission").namespace(),
            NAMESPACE_AUTH
        );
        assert!(catalog.resources_in(NAMESPACE_AUTH).contains(&"user"));
    }

    #[test]
    fn introspect_rejects_missing_tables() {
        let conn = open_db_in_memory().expect("in-memory db");
        let mut catalog = ResourceCatalog::new();
        let err = catalog
            .introspect(&conn, NAMESPACE_FLEET, &["service_install"])
            .expect_err("missing table must fail");
        assert!(matches!(err, ApiError::UnknownResource(name) if name == "service_install"));
    }

    #[test]
    fn introspect_rejects_duplicate_registration() {
        let conn = open_db_in_memory().expect("in-memory db");
        let mut catalog = ResourceCatalog::new();
        catalog
            .introspect(&conn, NAMESPACE_FLEET, &["device"])
            .expect("first registration");
        assert!(catalog
            .introspect(&conn, NAMESPACE_AUTH, &["device"])
            .is_err());
    }
}
