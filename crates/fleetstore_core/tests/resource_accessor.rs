use fleetstore_core::db::open_db_in_memory;
use fleetstore_core::{
    record_from_json, register_cascade_delete, ApiError, CredentialScope, DependentSpec, Filter,
    HookRegistry, HookVerb, LogExceptionSink, Passthrough, PostOptions, PostResult, Record,
    RequestContext, ResourceAccessor, ResourceCatalog, SqliteResourceAccessor, Store,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn record(value: Value) -> Record {
    record_from_json(value).unwrap()
}

#[test]
fn post_returns_id_or_stored_resource() {
    let store = Store::open_in_memory().unwrap();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));

    let created = accessor
        .post(
            "application",
            &record(json!({"app_name": "edge", "slug": "org/edge"})),
            PostOptions::default(),
        )
        .unwrap();
    assert_eq!(created, PostResult::Id(1));

    let stored = accessor
        .post(
            "image",
            &record(json!({"image_location": "registry/app:1"})),
            PostOptions {
                return_resource: true,
            },
        )
        .unwrap();
    match stored {
        PostResult::Resource(row) => {
            assert_eq!(row["id"], json!(1));
            assert_eq!(row["status"], json!("pending"));
            assert_eq!(row["image_location"], json!("registry/app:1"));
        }
        other => panic!("unexpected post result: {other:?}"),
    }

    let actor = accessor
        .post("actor", &Record::new(), PostOptions::default())
        .unwrap();
    assert_eq!(actor.id(), Some(1));
}

#[test]
fn get_supports_membership_null_and_select() {
    let store = Store::open_in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            "INSERT INTO device (uuid, device_name) VALUES ('a', 'gateway');
             INSERT INTO device (uuid) VALUES ('b');
             INSERT INTO device (uuid, device_name) VALUES ('c', 'sensor');",
        )
        .unwrap();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Model));

    let members = accessor
        .get(
            "device",
            &Filter::from_json(&json!({"uuid": {"$in": ["a", "c", "zzz"]}})).unwrap(),
            Some(&["id", "uuid"]),
        )
        .unwrap();
    assert_eq!(
        members,
        vec![
            record(json!({"id": 1, "uuid": "a"})),
            record(json!({"id": 3, "uuid": "c"})),
        ]
    );

    let unnamed = accessor
        .get("device", &Filter::new().with_eq("device_name", Value::Null), None)
        .unwrap();
    assert_eq!(unnamed.len(), 1);
    assert_eq!(unnamed[0]["uuid"], json!("b"));
    assert_eq!(unnamed[0]["device_name"], Value::Null);

    let none = accessor
        .get("device", &Filter::new().with_in("id", Vec::new()), None)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn scope_gate_rejects_foreign_namespaces_before_hooks_run() {
    let calls = Arc::new(Mutex::new(0));
    let hook_calls = Arc::clone(&calls);
    let store = Store::builder(open_db_in_memory().unwrap())
        .with_pre_run_hook(HookVerb::Get, "auth", "permission", move |_| {
            *hook_calls.lock().unwrap() += 1;
            Ok(())
        })
        .build()
        .unwrap();
    let request = RequestContext::new();

    let model = store.accessor(&request, Passthrough::scope(CredentialScope::Model));
    let err = model.get("permission", &Filter::new(), None).unwrap_err();
    assert!(matches!(
        err,
        ApiError::ScopeDenied {
            scope: CredentialScope::Model,
            ref resource,
        } if resource == "permission"
    ));
    assert_eq!(*calls.lock().unwrap(), 0);

    let auth = model.with_passthrough(Passthrough::scope(CredentialScope::Auth));
    assert_eq!(auth.scope(), CredentialScope::Auth);
    assert!(auth.get("permission", &Filter::new(), None).unwrap().is_empty());
    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(matches!(
        auth.delete("device", &Filter::new()),
        Err(ApiError::ScopeDenied { .. })
    ));
}

#[test]
fn unknown_resources_and_fields_are_rejected() {
    let store = Store::open_in_memory().unwrap();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));

    assert!(matches!(
        accessor.get("sqlite_master", &Filter::new(), None),
        Err(ApiError::UnknownResource(_))
    ));
    assert!(matches!(
        accessor.get("device", &Filter::new().with_eq("owner", 1), None),
        Err(ApiError::UnknownField { .. })
    ));
    assert!(matches!(
        accessor.get("device", &Filter::new(), Some(&["uuid; DROP TABLE device"])),
        Err(ApiError::UnknownField { .. })
    ));
    assert!(matches!(
        accessor.post(
            "device",
            &record(json!({"uuid": "a", "bogus": true})),
            PostOptions::default()
        ),
        Err(ApiError::UnknownField { .. })
    ));
    assert!(matches!(
        accessor.post(
            "device",
            &record(json!({"uuid": ["not", "scalar"]})),
            PostOptions::default()
        ),
        Err(ApiError::InvalidValue { .. })
    ));
}

#[test]
fn patch_updates_fields_and_reports_missing_rows() {
    let store = Store::open_in_memory().unwrap();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));
    let id = accessor
        .post(
            "device",
            &record(json!({"uuid": "a", "device_name": "old"})),
            PostOptions::default(),
        )
        .unwrap()
        .id()
        .unwrap();

    accessor
        .patch("device", id, &record(json!({"device_name": "new", "is_online": true})))
        .unwrap();
    let rows = accessor.get("device", &Filter::id_in(&[id]), None).unwrap();
    assert_eq!(rows[0]["device_name"], json!("new"));
    assert_eq!(rows[0]["is_online"], json!(1));

    accessor.patch("device", id, &Record::new()).unwrap();
    assert!(matches!(
        accessor.patch("device", 99, &record(json!({"device_name": "x"}))),
        Err(ApiError::NotFound { id: 99, .. })
    ));
    assert!(matches!(
        accessor.patch("device", 99, &Record::new()),
        Err(ApiError::NotFound { .. })
    ));
    assert!(matches!(
        accessor.patch("device", id, &record(json!({"id": 5}))),
        Err(ApiError::InvalidValue { .. })
    ));
}

#[test]
fn hooks_run_in_registration_order_and_stop_at_first_failure() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&journal);
    let second = Arc::clone(&journal);
    let third = Arc::clone(&journal);
    let store = Store::builder(open_db_in_memory().unwrap())
        .with_pre_run_hook(HookVerb::Post, "fleet", "image", move |context| {
            assert!(context.filter.is_empty());
            assert!(context.body.is_some());
            first.lock().unwrap().push("first");
            Ok(())
        })
        .with_pre_run_hook(HookVerb::Post, "fleet", "image", move |context| {
            second.lock().unwrap().push("second");
            Err(ApiError::hook_rejected(context.resource, "registry offline"))
        })
        .with_pre_run_hook(HookVerb::Post, "fleet", "image", move |_| {
            third.lock().unwrap().push("third");
            Ok(())
        })
        .build()
        .unwrap();
    let request = RequestContext::new();
    let accessor = store.accessor(&request, Passthrough::scope(CredentialScope::Root));

    let err = accessor
        .post(
            "image",
            &record(json!({"image_location": "registry/app:1"})),
            PostOptions::default(),
        )
        .unwrap_err();

    assert!(matches!(err, ApiError::HookRejected { .. }));
    assert_eq!(*journal.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(store.hooks().hook_count(HookVerb::Post, "fleet", "image"), 3);
    let images: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM image;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(images, 0);
}

#[test]
fn hand_built_accessor_runs_registered_cascades() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO device (uuid) VALUES ('a');
         INSERT INTO device_tag (device_id, tag_key) VALUES (1, 'region');",
    )
    .unwrap();
    let catalog = ResourceCatalog::fleet_default(&conn).unwrap();
    let mut hooks = HookRegistry::new();
    register_cascade_delete(
        &mut hooks,
        "fleet",
        "device",
        vec![DependentSpec::new("device_tag", "device_id")],
        Arc::new(LogExceptionSink),
    );
    assert_eq!(hooks.hook_count(HookVerb::Delete, "fleet", "device"), 1);
    assert_eq!(hooks.hook_count(HookVerb::Delete, "fleet", "device_tag"), 0);

    let request = RequestContext::new();
    let accessor =
        SqliteResourceAccessor::new(&conn, &catalog, &hooks, &request, CredentialScope::Root);
    assert!(!accessor.in_transaction());
    accessor
        .delete("device", &Filter::new().with_eq("uuid", "a"))
        .unwrap();

    let remaining: i64 = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM device) + (SELECT COUNT(*) FROM device_tag);",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn catalog_lists_resources_by_namespace() {
    let store = Store::open_in_memory().unwrap();
    let catalog = store.catalog();

    assert_eq!(
        catalog.resources_in("auth"),
        vec!["actor", "api_key", "api_key__has__permission", "permission", "user"]
    );
    assert_eq!(catalog.resources_in("fleet").len(), 9);
    let device = catalog.resolve("device").unwrap();
    assert_eq!(device.namespace(), "fleet");
    assert!(device.has_column("uuid"));
    assert!(!device.has_column("api_key_id"));
}
