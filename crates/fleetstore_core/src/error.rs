//! Error taxonomy for resource access, upserts and cascading deletes.
//!
//! # Invariants
//! - Store errors are wrapped, never rewritten: `ApiError::Db` keeps the
//!   original `rusqlite::Error` reachable through `source()`.
//! - `DependentDeletion` always carries the failure that aborted the cascade.

use crate::db::DbError;
use crate::model::filter::Filter;
use crate::model::record::RecordId;
use crate::repo::scope::CredentialScope;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Underlying SQLite/bootstrap error, propagated unchanged.
    Db(DbError),
    /// `update_or_insert` matched more than one row.
    NonUniqueFilter { resource: String, filter: Filter },
    /// A dependent (or sub-dependent) delete failed during a cascade.
    DependentDeletion {
        resource: String,
        parent: String,
        source: Box<ApiError>,
    },
    /// Resource name is not part of the catalog.
    UnknownResource(String),
    /// Field name is not a column of the resource.
    UnknownField { resource: String, field: String },
    /// Credential scope does not reach the resource's namespace.
    ScopeDenied {
        scope: CredentialScope,
        resource: String,
    },
    /// Resource or field name is not a plain lowercase identifier.
    InvalidIdentifier(String),
    /// A cascade rule names a resource under the wrong namespace.
    NamespaceMismatch {
        resource: String,
        declared: String,
        actual: String,
    },
    /// Filter cannot be parsed or used in the requested position.
    InvalidFilter(String),
    /// Field value cannot be stored.
    InvalidValue { field: String, message: String },
    /// Patch target does not exist.
    NotFound { resource: String, id: RecordId },
    /// A pre-run hook refused the mutation.
    HookRejected { resource: String, message: String },
}

impl ApiError {
    /// Convenience constructor used by pre-run hooks that veto a request.
    pub fn hook_rejected(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookRejected {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(_) => "db_error",
            Self::NonUniqueFilter { .. } => "non_unique_filter",
            Self::DependentDeletion { .. } => "dependent_deletion_failed",
            Self::UnknownResource(_) => "unknown_resource",
            Self::UnknownField { .. } => "unknown_field",
            Self::ScopeDenied { .. } => "scope_denied",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::NamespaceMismatch { .. } => "namespace_mismatch",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::InvalidValue { .. } => "invalid_value",
            Self::NotFound { .. } => "not_found",
            Self::HookRejected { .. } => "hook_rejected",
        }
    }

    /// Walks `DependentDeletion` wrappers down to the failure that started the abort.
    pub fn root_cause(&self) -> &ApiError {
        match self {
            Self::DependentDeletion { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NonUniqueFilter { resource, filter } => write!(
                f,
                "unable to update or insert `{resource}`: filter {filter} is not unique"
            ),
            Self::DependentDeletion {
                resource,
                parent,
                source,
            } => write!(
                f,
                "failed to delete `{resource}` rows depending on `{parent}`: {source}"
            ),
            Self::UnknownResource(resource) => write!(f, "unknown resource `{resource}`"),
            Self::UnknownField { resource, field } => {
                write!(f, "resource `{resource}` has no field `{field}`")
            }
            Self::ScopeDenied { scope, resource } => write!(
                f,
                "credential scope `{}` cannot access resource `{resource}`",
                scope.as_str()
            ),
            Self::InvalidIdentifier(value) => write!(f, "invalid identifier `{value}`"),
            Self::NamespaceMismatch {
                resource,
                declared,
                actual,
            } => write!(
                f,
                "resource `{resource}` belongs to namespace `{actual}`, not `{declared}`"
            ),
            Self::InvalidFilter(message) => write!(f, "invalid filter: {message}"),
            Self::InvalidValue { field, message } => {
                write!(f, "invalid value for field `{field}`: {message}")
            }
            Self::NotFound { resource, id } => write!(f, "`{resource}` row not found: {id}"),
            Self::HookRejected { resource, message } => {
                write!(f, "request on `{resource}` rejected: {message}")
            }
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::DependentDeletion { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
