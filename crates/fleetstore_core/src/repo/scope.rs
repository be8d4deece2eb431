//! Credential scopes that gate which resource namespaces a handle may reach.

use crate::repo::catalog::{NAMESPACE_AUTH, NAMESPACE_FLEET};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Credential scope bound to a resource accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialScope {
    /// Unrestricted; used by migrations, maintenance and the CLI.
    Root,
    /// Fleet model resources only.
    Model,
    /// Auth resources only.
    Auth,
}

/// String value for root scope.
pub const CREDENTIAL_SCOPE_ROOT: &str = "root";
/// String value for model scope.
pub const CREDENTIAL_SCOPE_MODEL: &str = "model";
/// String value for auth scope.
pub const CREDENTIAL_SCOPE_AUTH: &str = "auth";

impl CredentialScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => CREDENTIAL_SCOPE_ROOT,
            Self::Model => CREDENTIAL_SCOPE_MODEL,
            Self::Auth => CREDENTIAL_SCOPE_AUTH,
        }
    }

    /// Returns whether this scope may touch resources of `namespace`.
    pub fn permits(self, namespace: &str) -> bool {
        match self {
            Self::Root => true,
            Self::Model => namespace == NAMESPACE_FLEET,
            Self::Auth => namespace == NAMESPACE_AUTH,
        }
    }
}

/// Parses a scope from its string value.
pub fn parse_credential_scope(value: &str) -> Result<CredentialScope, CredentialScopeError> {
    match value.trim() {
        "" => Err(CredentialScopeError::EmptyScope),
        CREDENTIAL_SCOPE_ROOT => Ok(CredentialScope::Root),
        CREDENTIAL_SCOPE_MODEL => Ok(CredentialScope::Model),
        CREDENTIAL_SCOPE_AUTH => Ok(CredentialScope::Auth),
        other => Err(CredentialScopeError::UnsupportedScope(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialScopeError {
    EmptyScope,
    UnsupportedScope(String),
}

impl Display for CredentialScopeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyScope => write!(f, "credential scope must not be empty"),
            Self::UnsupportedScope(value) => {
                write!(f, "credential scope is unsupported: {value}; expected root|model|auth")
            }
        }
    }
}

impl Error for CredentialScopeError {}
