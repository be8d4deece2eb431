//! Read-check-then-write upsert primitives.
//!
//! # Invariants
//! - At most one write per call.
//! - `update_or_insert` never writes when its filter matches several rows.
//! - Neither primitive is atomic against concurrent callers: two callers can
//!   both observe zero matches and both insert.

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::model::filter::Filter;
use crate::model::record::{merge_records, require_record_id, Record, RecordId, ID_FIELD};
use crate::repo::resource_accessor::{Passthrough, PostOptions, ResourceAccessor};
use crate::repo::scope::CredentialScope;
use crate::store::Store;
use log::debug;
use rusqlite::Transaction;
use serde_json::Value;

/// Outcome of `get_or_insert_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertResult {
    pub id: RecordId,
    /// `body` merged with the new id after an insert; the matched `{id}` row otherwise.
    pub record: Record,
    pub inserted: bool,
}

/// Returns the id of a row equal to `body` on every field, inserting one if none exists.
///
/// When several rows match, the first one the store returns wins.
pub fn get_or_insert_id(
    accessor: &dyn ResourceAccessor,
    resource: &str,
    body: &Record,
) -> ApiResult<UpsertResult> {
    let filter = Filter::from_record(body);
    let existing = accessor.get(resource, &filter, Some(&[ID_FIELD]))?;

    if let Some(first) = existing.into_iter().next() {
        let id = require_record_id(resource, &first)?;
        debug!(
            "event=get_or_insert module=upsert status=ok outcome=found resource={} id={}",
            resource, id
        );
        return Ok(UpsertResult {
            id,
            record: first,
            inserted: false,
        });
    }

    let id = insert(accessor, resource, body)?;
    let mut record = body.clone();
    record.insert(ID_FIELD.to_string(), Value::from(id));
    debug!(
        "event=get_or_insert module=upsert status=ok outcome=inserted resource={} id={}",
        resource, id
    );
    Ok(UpsertResult {
        id,
        record,
        inserted: true,
    })
}

/// Patches the single row matching `filter`, or inserts `filter` merged with
/// `update_fields` when none matches.
///
/// # Errors
/// - `NonUniqueFilter` when more than one row matches; nothing is written.
/// - `InvalidFilter` when an insert is needed and `filter` holds `$in` predicates.
pub fn update_or_insert(
    accessor: &dyn ResourceAccessor,
    resource: &str,
    filter: &Filter,
    update_fields: &Record,
) -> ApiResult<RecordId> {
    let existing = accessor.get(resource, filter, Some(&[ID_FIELD]))?;

    match existing.as_slice() {
        [] => {
            let body = merge_records(&filter.to_insert_body()?, update_fields);
            let id = insert(accessor, resource, &body)?;
            debug!(
                "event=update_or_insert module=upsert status=ok outcome=inserted resource={} id={}",
                resource, id
            );
            Ok(id)
        }
        [row] => {
            let id = require_record_id(resource, row)?;
            accessor.patch(resource, id, update_fields)?;
            debug!(
                "event=update_or_insert module=upsert status=ok outcome=updated resource={} id={}",
                resource, id
            );
            Ok(id)
        }
        rows => {
            debug!(
                "event=update_or_insert module=upsert status=error error_code=non_unique_filter resource={} matches={}",
                resource,
                rows.len()
            );
            Err(ApiError::NonUniqueFilter {
                resource: resource.to_string(),
                filter: filter.clone(),
            })
        }
    }
}

fn insert(accessor: &dyn ResourceAccessor, resource: &str, body: &Record) -> ApiResult<RecordId> {
    let created = accessor.post(resource, body, PostOptions::default())?;
    created.id().ok_or_else(|| ApiError::InvalidValue {
        field: ID_FIELD.to_string(),
        message: format!("insert into `{resource}` returned no id"),
    })
}

/// `get_or_insert_id` under the auth credential scope.
pub fn get_or_insert_id_auth(
    store: &Store,
    request: &RequestContext,
    tx: Option<&Transaction<'_>>,
    resource: &str,
    body: &Record,
) -> ApiResult<UpsertResult> {
    let accessor = store.accessor(request, Passthrough::new(CredentialScope::Auth, tx));
    get_or_insert_id(&accessor, resource, body)
}

/// `update_or_insert` under the auth credential scope.
pub fn update_or_insert_auth(
    store: &Store,
    request: &RequestContext,
    tx: Option<&Transaction<'_>>,
    resource: &str,
    filter: &Filter,
    update_fields: &Record,
) -> ApiResult<RecordId> {
    let accessor = store.accessor(request, Passthrough::new(CredentialScope::Auth, tx));
    update_or_insert(&accessor, resource, filter, update_fields)
}

/// `get_or_insert_id` under the model credential scope.
pub fn get_or_insert_id_model(
    store: &Store,
    request: &RequestContext,
    tx: Option<&Transaction<'_>>,
    resource: &str,
    body: &Record,
) -> ApiResult<UpsertResult> {
    let accessor = store.accessor(request, Passthrough::new(CredentialScope::Model, tx));
    get_or_insert_id(&accessor, resource, body)
}

/// `update_or_insert` under the model credential scope.
pub fn update_or_insert_model(
    store: &Store,
    request: &RequestContext,
    tx: Option<&Transaction<'_>>,
    resource: &str,
    filter: &Filter,
    update_fields: &Record,
) -> ApiResult<RecordId> {
    let accessor = store.accessor(request, Passthrough::new(CredentialScope::Model, tx));
    update_or_insert(&accessor, resource, filter, update_fields)
}
