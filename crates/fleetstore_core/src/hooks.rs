//! Pre-run hook dispatch table.
//!
//! # Responsibility
//! - Map `(verb, namespace, resource)` to an ordered list of handlers.
//! - Run handlers in registration order before the store executes a request.
//!
//! # Invariants
//! - The first failing handler aborts the request; later handlers do not run.
//! - The registry is immutable once handed to an accessor.

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::model::filter::Filter;
use crate::model::record::Record;
use crate::repo::resource_accessor::ResourceAccessor;
use log::debug;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Request verb a hook is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookVerb {
    Get,
    Post,
    Patch,
    Delete,
}

impl HookVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Everything a handler can see about the request it guards.
pub struct HookContext<'a> {
    pub verb: HookVerb,
    pub namespace: &'a str,
    pub resource: &'a str,
    /// Rows the request targets. Empty for `POST`; the `id` for `PATCH`.
    pub filter: &'a Filter,
    /// Payload for `POST` and `PATCH`.
    pub body: Option<&'a Record>,
    pub request: &'a RequestContext,
    /// Accessor issuing the request, bound to the same scope and transaction.
    pub accessor: &'a dyn ResourceAccessor,
}

/// Handler invoked before the store runs a request.
pub type PreRunHook = Arc<dyn Fn(&HookContext<'_>) -> ApiResult<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct HookKey {
    verb: HookVerb,
    namespace: String,
    resource: String,
}

/// Dispatch table injected into accessors at construction time.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<HookKey, Vec<PreRunHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `(verb, namespace, resource)`.
    pub fn register_pre_run_hook<F>(
        &mut self,
        verb: HookVerb,
        namespace: &str,
        resource: &str,
        handler: F,
    ) where
        F: Fn(&HookContext<'_>) -> ApiResult<()> + Send + Sync + 'static,
    {
        self.hooks
            .entry(HookKey {
                verb,
                namespace: namespace.to_string(),
                resource: resource.to_string(),
            })
            .or_default()
            .push(Arc::new(handler));
    }

    /// Appends every handler of `other` after the handlers already registered
    /// for the same key.
    pub fn extend(&mut self, other: HookRegistry) {
        for (key, handlers) in other.hooks {
            self.hooks.entry(key).or_default().extend(handlers);
        }
    }

    /// Number of handlers registered for one key.
    pub fn hook_count(&self, verb: HookVerb, namespace: &str, resource: &str) -> usize {
        self.hooks
            .get(&HookKey {
                verb,
                namespace: namespace.to_string(),
                resource: resource.to_string(),
            })
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs all handlers for the context's key in order, stopping at the first error.
    pub fn run_pre_run_hooks(&self, context: &HookContext<'_>) -> ApiResult<()> {
        let key = HookKey {
            verb: context.verb,
            namespace: context.namespace.to_string(),
            resource: context.resource.to_string(),
        };
        let Some(handlers) = self.hooks.get(&key) else {
            return Ok(());
        };

        debug!(
            "event=pre_run_hooks module=hooks status=start verb={} resource={} count={} request_id={}",
            context.verb.as_str(),
            context.resource,
            handlers.len(),
            context.request.request_id()
        );
        for handler in handlers {
            handler(context)?;
        }
        Ok(())
    }
}

impl Debug for HookRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, handlers) in &self.hooks {
            map.entry(
                &format!("{} {}.{}", key.verb.as_str(), key.namespace, key.resource),
                &handlers.len(),
            );
        }
        map.finish()
    }
}
