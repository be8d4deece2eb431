use fleetstore_core::db::open_db_in_memory;
use fleetstore_core::{
    current_affected_ids, CredentialScope, Filter, HookRegistry, HookVerb, Passthrough,
    RequestContext, ResourceCatalog, SqliteResourceAccessor, Store,
};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn store_counting_device_reads() -> (Store, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let hook_reads = Arc::clone(&reads);
    let store = Store::builder(open_db_in_memory().unwrap())
        .with_pre_run_hook(HookVerb::Get, "fleet", "device", move |_| {
            hook_reads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();
    store
        .connection()
        .execute_batch(
            "INSERT INTO device (uuid, is_online) VALUES ('a', 1);
             INSERT INTO device (uuid, is_online) VALUES ('b', 0);
             INSERT INTO device (uuid, is_online) VALUES ('c', 1);",
        )
        .unwrap();
    (store, reads)
}

#[test]
fn same_context_resolves_affected_ids_once() {
    let (store, reads) = store_counting_device_reads();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));
    let online = Filter::new().with_eq("is_online", 1);

    let first = current_affected_ids(&request, &accessor, "device", &online).unwrap();
    let second = current_affected_ids(&request, &accessor, "device", &online).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(first.ids(), &[1, 3]);
    assert_eq!(first.resource(), "device");
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(request.cached_affected_ids(), 1);
}

#[test]
fn distinct_filters_and_contexts_resolve_separately() {
    let (store, reads) = store_counting_device_reads();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));

    let online = current_affected_ids(
        &request,
        &accessor,
        "device",
        &Filter::new().with_eq("is_online", 1),
    )
    .unwrap();
    let offline = current_affected_ids(
        &request,
        &accessor,
        "device",
        &Filter::new().with_eq("is_online", 0),
    )
    .unwrap();
    assert_eq!(online.len(), 2);
    assert_eq!(offline.ids(), &[2]);
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    let next_request = RequestContext::new();
    let next_accessor = store.accessor(&next_request, Passthrough::scope(CredentialScope::Root));
    let again = current_affected_ids(
        &next_request,
        &next_accessor,
        "device",
        &Filter::new().with_eq("is_online", 1),
    )
    .unwrap();
    assert!(!Rc::ptr_eq(&online, &again));
    assert_eq!(online.ids(), again.ids());
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn empty_match_is_cached_as_empty_set() {
    let (store, reads) = store_counting_device_reads();
    let request = RequestContext::for_actor(7);
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));
    let missing = Filter::new().with_eq("uuid", "zzz");

    let first = current_affected_ids(&request, &accessor, "device", &missing).unwrap();
    let second = current_affected_ids(&request, &accessor, "device", &missing).unwrap();

    assert!(first.is_empty());
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[test]
fn scope_denied_resolution_is_not_cached() {
    let conn = open_db_in_memory().unwrap();
    let catalog = ResourceCatalog::fleet_default(&conn).unwrap();
    let hooks = HookRegistry::new();
    let request = RequestContext::new();
    let auth =
        SqliteResourceAccessor::new(&conn, &catalog, &hooks, &request, CredentialScope::Auth);

    assert!(current_affected_ids(&request, &auth, "device", &Filter::new()).is_err());
    assert_eq!(request.cached_affected_ids(), 0);

    let root = auth.with_passthrough(Passthrough::scope(CredentialScope::Root));
    let ids = current_affected_ids(&request, &root, "device", &Filter::new()).unwrap();
    assert!(ids.is_empty());
    assert_eq!(request.cached_affected_ids(), 1);
}
