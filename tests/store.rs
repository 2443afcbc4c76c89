// tests/store.rs

//! Versioned store tests: lifecycle, chain invariants, ACL preservation.

mod common;

use common::{actor, anonymous, entity_type, entity_type_with_schema, new_entity, write_acl};
use rusqlite::Connection;
use serde_json::json;
use trellis::{Error, ResourceKind, store};

const KIND: ResourceKind = ResourceKind::Entity;

fn latest_count(conn: &Connection, chain_handle: &str) -> i64 {
    let ids = trellis::chain::chain_ids(conn, KIND, chain_handle).unwrap();
    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM entities WHERE is_latest = 1 AND id IN ({})",
            placeholders.join(", ")
        ),
        rusqlite::params_from_iter(ids),
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn test_create_round_trip() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let created = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"title": "hello"}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();

    assert_eq!(created.version, 1);
    assert!(created.is_latest);
    assert!(!created.is_deleted);
    assert_eq!(created.previous_version_id, None);
    assert_eq!(created.created_by.as_deref(), Some("alice"));

    let read = store::get_latest(&conn, KIND, &created.id, &alice, false).unwrap();
    assert_eq!(read.id, created.id);
    assert_eq!(read.properties_value().unwrap(), json!({"title": "hello"}));
}

#[test]
fn test_update_bumps_version_and_preserves_acl() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"n": 1}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    let original_acl = v1.acl_id.unwrap();

    let v2 = store::update(&mut conn, KIND, &v1.id, &json!({"n": 2}), &alice, 101).unwrap();

    assert_eq!(v2.version, 2);
    assert_ne!(v2.id, v1.id);
    assert_eq!(v2.previous_version_id.as_deref(), Some(v1.id.as_str()));
    // acl carried verbatim, so alice keeps write on the new version
    assert_eq!(v2.acl_id, Some(original_acl));
    assert!(
        trellis::acl::has_permission(&conn, &alice, v2.acl_id, trellis::Permission::Write)
            .unwrap()
    );

    assert_eq!(latest_count(&conn, &v1.id), 1);
}

#[test]
fn test_old_handle_resolves_to_latest() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"n": 1}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    let _v2 = store::update(&mut conn, KIND, &v1.id, &json!({"n": 2}), &alice, 101).unwrap();
    let v3 = store::update(&mut conn, KIND, &v1.id, &json!({"n": 3}), &alice, 102).unwrap();

    // reading through the original row id lands on v3
    let read = store::get_latest(&conn, KIND, &v1.id, &alice, false).unwrap();
    assert_eq!(read.id, v3.id);
    assert_eq!(read.version, 3);

    let versions = store::list_versions(&conn, KIND, &v1.id, &alice).unwrap();
    let numbers: Vec<i64> = versions.iter().map(|r| r.version).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    // version chain invariants hold along the chain
    for (i, row) in versions.iter().enumerate() {
        assert_eq!(row.version, i as i64 + 1);
        assert_eq!(row.previous_version_id.is_none(), row.version == 1);
    }
}

#[test]
fn test_get_version_and_invalid_version() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"n": 1}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    let v2 = store::update(&mut conn, KIND, &v1.id, &json!({"n": 2}), &alice, 101).unwrap();

    let fetched = store::get_version(&conn, KIND, &v2.id, 1, &alice).unwrap();
    assert_eq!(fetched.id, v1.id);

    assert!(matches!(
        store::get_version(&conn, KIND, &v1.id, 5, &alice),
        Err(Error::InvalidVersion { .. })
    ));
    assert!(matches!(
        store::get_version(&conn, KIND, common::ABSENT_ID, 1, &alice),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_malformed_ids_rejected_before_lookup() {
    let (_path, mut conn) = common::test_db();
    let alice = actor("alice");

    // every handle-taking operation rejects a non-UUID id up front
    assert!(matches!(
        store::get_latest(&conn, KIND, "not-a-uuid", &alice, false),
        Err(Error::Validation { ref field, .. }) if field == "id"
    ));
    assert!(matches!(
        store::get_version(&conn, KIND, "not-a-uuid", 1, &alice),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        store::list_versions(&conn, KIND, "not-a-uuid", &alice),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        store::update(&mut conn, KIND, "not-a-uuid", &json!({}), &alice, 100),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        store::soft_delete(&mut conn, KIND, "not-a-uuid", &alice, 100),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        store::restore(&mut conn, KIND, "not-a-uuid", &alice, 100),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        store::set_acl(&mut conn, KIND, "not-a-uuid", &write_acl("alice"), &alice, 100),
        Err(Error::Validation { .. })
    ));
}

#[test]
fn test_delete_is_versioned_and_idempotence_rejected() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();

    let deleted = store::soft_delete(&mut conn, KIND, &v1.id, &alice, 101).unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.version, 2);

    // second delete adds no version
    assert!(matches!(
        store::soft_delete(&mut conn, KIND, &v1.id, &alice, 102),
        Err(Error::AlreadyDeleted(_))
    ));
    let versions = store::list_versions(&conn, KIND, &v1.id, &alice).unwrap();
    assert_eq!(versions.len(), 2);

    // deleted chains hide from plain reads but stay addressable
    assert!(matches!(
        store::get_latest(&conn, KIND, &v1.id, &alice, false),
        Err(Error::NotFound(_))
    ));
    let read = store::get_latest(&conn, KIND, &v1.id, &alice, true).unwrap();
    assert!(read.is_deleted);
}

#[test]
fn test_restore_lifecycle() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();

    assert!(matches!(
        store::restore(&mut conn, KIND, &v1.id, &alice, 101),
        Err(Error::NotDeleted(_))
    ));

    store::soft_delete(&mut conn, KIND, &v1.id, &alice, 102).unwrap();
    let restored = store::restore(&mut conn, KIND, &v1.id, &alice, 103).unwrap();
    assert!(!restored.is_deleted);
    assert_eq!(restored.version, 3);
    assert_eq!(latest_count(&conn, &v1.id), 1);
}

#[test]
fn test_update_of_deleted_chain_rejected() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    store::soft_delete(&mut conn, KIND, &v1.id, &alice, 101).unwrap();

    assert!(matches!(
        store::update(&mut conn, KIND, &v1.id, &json!({"n": 1}), &alice, 102),
        Err(Error::ResourceDeleted(_))
    ));
}

#[test]
fn test_schema_validation_on_create_and_update() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type_with_schema(
        &conn,
        "person",
        &json!({
            "type": "object",
            "properties": {"age": {"type": "integer", "minimum": 0}},
            "required": ["age"]
        }),
    );
    let alice = actor("alice");

    let err = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"age": -1}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap_err();
    let Error::SchemaValidationFailed(issues) = err else {
        panic!("expected schema failure");
    };
    assert!(issues.iter().any(|i| i.keyword == "minimum"));

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"age": 30}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    assert!(matches!(
        store::update(&mut conn, KIND, &v1.id, &json!({}), &alice, 101),
        Err(Error::SchemaValidationFailed(_))
    ));
}

#[test]
fn test_unknown_type_rejected() {
    let (_path, mut conn) = common::test_db();
    let alice = actor("alice");

    assert!(matches!(
        store::create(
            &mut conn,
            KIND,
            &new_entity("no-such-type", json!({}), vec![]),
            &alice,
            100,
        ),
        Err(Error::TypeNotFound(_))
    ));
}

#[test]
fn test_set_acl_is_the_only_acl_change() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");
    let bob = actor("bob");

    let v1 = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();

    let mut entries = write_acl("alice");
    entries.extend(write_acl("bob"));
    let v2 = store::set_acl(&mut conn, KIND, &v1.id, &entries, &alice, 101).unwrap();
    assert_eq!(v2.version, 2);
    assert_ne!(v2.acl_id, v1.acl_id);

    // bob can write now, and the grant persists through bob's update
    let v3 = store::update(&mut conn, KIND, &v1.id, &json!({"by": "bob"}), &bob, 102).unwrap();
    assert_eq!(v3.acl_id, v2.acl_id);
}

#[test]
fn test_null_acl_is_public_read_but_never_writable() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let public = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"open": true}), vec![]),
        &alice,
        100,
    )
    .unwrap();
    assert_eq!(public.acl_id, None);

    // readable without any authentication
    let read = store::get_latest(&conn, KIND, &public.id, &anonymous(), false).unwrap();
    assert_eq!(read.id, public.id);

    // write is only granted by an explicit ACL entry
    assert!(matches!(
        store::update(&mut conn, KIND, &public.id, &json!({}), &alice, 101),
        Err(Error::Forbidden(_))
    ));

    // a guarded entity stays hidden from anonymous callers
    let guarded = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    assert!(matches!(
        store::get_latest(&conn, KIND, &guarded.id, &anonymous(), false),
        Err(Error::Forbidden(_))
    ));
}

#[test]
fn test_acl_deduplication_across_resources() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let a = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    let b = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({}), write_acl("alice")),
        &alice,
        101,
    )
    .unwrap();

    assert_eq!(a.acl_id, b.acl_id);
    let acl_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM acls", [], |row| row.get(0))
        .unwrap();
    assert_eq!(acl_rows, 1);
}
