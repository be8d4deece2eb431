//! Per-request state: identity and the affected-ids memoization cache.
//!
//! # Invariants
//! - One `RequestContext` per inbound request; never shared across requests.
//! - For a given key the resolver runs at most once per context; every later
//!   caller receives the same `Rc`.
//! - Failed resolutions are not cached.

use crate::error::ApiResult;
use crate::model::filter::Filter;
use crate::model::record::{require_record_id, RecordId, ID_FIELD};
use crate::repo::resource_accessor::ResourceAccessor;
use log::debug;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// Identifier of the actor on whose behalf a request runs.
pub type ActorId = i64;

/// Primary-resource ids targeted by one in-flight mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedIds {
    resource: String,
    ids: Vec<RecordId>,
}

impl AffectedIds {
    pub fn new(resource: impl Into<String>, ids: Vec<RecordId>) -> Self {
        Self {
            resource: resource.into(),
            ids,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids as JSON values, ready for an `$in` predicate.
    pub fn to_values(&self) -> Vec<Value> {
        self.ids.iter().map(|id| Value::from(*id)).collect()
    }
}

/// State bag created once per inbound request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    actor: Option<ActorId>,
    affected_ids: RefCell<HashMap<String, Rc<AffectedIds>>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Context with a fresh request id and no actor.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: None,
            affected_ids: RefCell::new(HashMap::new()),
        }
    }

    /// Context acting on behalf of `actor`.
    pub fn for_actor(actor: ActorId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::new()
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn actor(&self) -> Option<ActorId> {
        self.actor
    }

    /// Number of memoized affected-id results.
    pub fn cached_affected_ids(&self) -> usize {
        self.affected_ids.borrow().len()
    }

    /// Returns the memoized result for `key`, running `resolver` on first use.
    ///
    /// The cache is not borrowed while `resolver` runs, so a resolver may issue
    /// accessor calls that consult the same context for other keys.
    pub fn affected_ids_or_resolve<F>(&self, key: &str, resolver: F) -> ApiResult<Rc<AffectedIds>>
    where
        F: FnOnce() -> ApiResult<AffectedIds>,
    {
        if let Some(cached) = self.affected_ids.borrow().get(key) {
            return Ok(Rc::clone(cached));
        }

        let resolved = Rc::new(resolver()?);
        debug!(
            "event=affected_ids_resolve module=context status=ok request_id={} resource={} count={}",
            self.request_id,
            resolved.resource(),
            resolved.len()
        );

        let mut cache = self.affected_ids.borrow_mut();
        let entry = cache.entry(key.to_string()).or_insert(resolved);
        Ok(Rc::clone(entry))
    }
}

/// Resolves the ids of `resource` rows matched by the in-flight `filter`.
///
/// Memoized on `context` by resource and canonical filter.
pub fn current_affected_ids(
    context: &RequestContext,
    accessor: &dyn ResourceAccessor,
    resource: &str,
    filter: &Filter,
) -> ApiResult<Rc<AffectedIds>> {
    let key = format!("{resource}:{}", filter.canonical_key());
    context.affected_ids_or_resolve(&key, || {
        let rows = accessor.get(resource, filter, Some(&[ID_FIELD]))?;
        let ids = rows
            .iter()
            .map(|row| require_record_id(resource, row))
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(AffectedIds::new(resource, ids))
    })
}

#[cfg(test)]
mod tests {
    use super::{AffectedIds, RequestContext};
    use crate::error::ApiError;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn resolver_runs_once_per_key() {
        let context = RequestContext::new();
        let calls = Cell::new(0);
        let resolve = || {
            calls.set(calls.get() + 1);
            Ok(AffectedIds::new("device", vec![5]))
        };

        let first = context
            .affected_ids_or_resolve("device:{}", resolve)
            .expect("first resolution");
        let second = context
            .affected_ids_or_resolve("device:{}", || {
                calls.set(calls.get() + 1);
                Ok(AffectedIds::new("device", vec![]))
            })
            .expect("cached resolution");

        assert_eq!(calls.get(), 1);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.ids(), &[5]);
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let context = RequestContext::new();
        let err = context
            .affected_ids_or_resolve("device:{}", || Err(ApiError::UnknownResource("x".into())))
            .expect_err("resolver error should surface");
        assert!(matches!(err, ApiError::UnknownResource(_)));
        assert_eq!(context.cached_affected_ids(), 0);

        let ids = context
            .affected_ids_or_resolve("device:{}", || Ok(AffectedIds::new("device", vec![1])))
            .expect("retry should resolve");
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn contexts_do_not_share_results() {
        let first = RequestContext::for_actor(9);
        let second = RequestContext::new();
        first
            .affected_ids_or_resolve("k", || Ok(AffectedIds::new("device", vec![1])))
            .expect("resolution");

        assert_eq!(first.actor(), Some(9));
        assert_eq!(second.cached_affected_ids(), 0);
        assert_ne!(first.request_id(), second.request_id());
    }
}
