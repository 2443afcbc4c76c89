// tests/query.rs

//! Listing and search tests: property coercion, cursor stability,
//! version/deletion visibility, ACL filter shapes.

mod common;

use common::{actor, entity_type, new_entity, write_acl};
use rusqlite::Connection;
use serde_json::json;
use trellis::acl::{self, AclFilter};
use trellis::query::{self, Cursor, FilterOp, ListFilter, PropertyFilter};
use trellis::{Permission, PrincipalSet, ResourceKind, store};

const KIND: ResourceKind = ResourceKind::Entity;

fn read_filter(conn: &Connection, actor: &PrincipalSet) -> AclFilter {
    acl::build_acl_filter(conn, actor, Permission::Read, 200).unwrap()
}

fn seed_people(conn: &mut Connection, type_id: &str, actor: &PrincipalSet) {
    for (i, (name, age)) in [("ada", 30), ("grace", 45), ("alan", 30)].iter().enumerate() {
        store::create(
            conn,
            KIND,
            &new_entity(type_id, json!({"name": name, "age": age}), vec![]),
            actor,
            100 + i as i64,
        )
        .unwrap();
    }
}

#[test]
fn test_property_equality_with_coercion() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "person");
    let alice = actor("alice");
    seed_people(&mut conn, &type_id, &alice);

    let acl_filter = read_filter(&conn, &alice);
    let mut filter = ListFilter::default();

    // "30" and "30.0" both coerce onto the stored integer
    for raw in ["30", "30.0"] {
        filter.property_equals = vec![("age".to_string(), query::coerce_scalar(raw))];
        let page =
            query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
        assert_eq!(page.items.len(), 2, "raw value {}", raw);
    }

    filter.property_equals = vec![("age".to_string(), query::coerce_scalar("foo"))];
    let page = query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
    assert!(page.items.is_empty());
}

#[test]
fn test_rich_property_filters() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "person");
    let alice = actor("alice");
    seed_people(&mut conn, &type_id, &alice);

    let acl_filter = read_filter(&conn, &alice);
    let mut filter = ListFilter::default();

    filter.property_filters = vec![PropertyFilter {
        path: "$.age".into(),
        op: FilterOp::Gte,
        value: json!(40),
    }];
    let page = query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 1);

    filter.property_filters = vec![PropertyFilter {
        path: "$.name".into(),
        op: FilterOp::StartsWith,
        value: json!("a"),
    }];
    let page = query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 2);

    filter.property_filters = vec![PropertyFilter {
        path: "$.nickname".into(),
        op: FilterOp::NotExists,
        value: json!(null),
    }];
    let page = query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 3);

    filter.property_filters = vec![PropertyFilter {
        path: "$.age".into(),
        op: FilterOp::In,
        value: json!([30, 99]),
    }];
    let page = query::list_resources(&conn, KIND, &filter, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 2);
}

#[test]
fn test_cursor_pages_are_disjoint_and_complete() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    for i in 0..7 {
        store::create(
            &mut conn,
            KIND,
            &new_entity(&type_id, json!({"n": i}), vec![]),
            &alice,
            // duplicate timestamps exercise the id tiebreak
            100 + (i / 2),
        )
        .unwrap();
    }

    let acl_filter = read_filter(&conn, &alice);
    let filter = ListFilter::default();

    let unpaged =
        query::list_resources(&conn, KIND, &filter, &acl_filter, 100, None, None).unwrap();
    assert_eq!(unpaged.items.len(), 7);
    assert!(!unpaged.has_more);

    let mut collected = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page = query::list_resources(
            &conn,
            KIND,
            &filter,
            &acl_filter,
            3,
            cursor.as_ref(),
            None,
        )
        .unwrap();
        collected.extend(page.items.iter().map(|r| r.id.clone()));
        match page.next_cursor {
            Some(next) if page.has_more => cursor = Cursor::decode(&next),
            _ => break,
        }
    }

    let unpaged_ids: Vec<String> = unpaged.items.iter().map(|r| r.id.clone()).collect();
    assert_eq!(collected, unpaged_ids);

    // pages were disjoint
    let mut dedup = collected.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), collected.len());
}

#[test]
fn test_versions_and_deletion_visibility() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");

    let row = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"n": 1}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    store::update(&mut conn, KIND, &row.id, &json!({"n": 2}), &alice, 101).unwrap();

    let other = store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"n": 9}), write_acl("alice")),
        &alice,
        102,
    )
    .unwrap();
    store::soft_delete(&mut conn, KIND, &other.id, &alice, 103).unwrap();

    let acl_filter = read_filter(&conn, &alice);

    // default: latest rows of live chains only
    let page = query::list_resources(
        &conn,
        KIND,
        &ListFilter::default(),
        &acl_filter,
        20,
        None,
        None,
    )
    .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].version, 2);

    let deleted_too = ListFilter {
        include_deleted: true,
        ..ListFilter::default()
    };
    let page =
        query::list_resources(&conn, KIND, &deleted_too, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 2);

    let everything = ListFilter {
        include_deleted: true,
        show_all_versions: true,
        ..ListFilter::default()
    };
    let page =
        query::list_resources(&conn, KIND, &everything, &acl_filter, 20, None, None).unwrap();
    assert_eq!(page.items.len(), 4);
}

#[test]
fn test_acl_filtering_hides_foreign_rows_in_both_shapes() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");
    let alice = actor("alice");
    let bob = actor("bob");

    store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"owner": "alice"}), write_acl("alice")),
        &alice,
        100,
    )
    .unwrap();
    store::create(
        &mut conn,
        KIND,
        &new_entity(&type_id, json!({"owner": "none"}), vec![]),
        &alice,
        101,
    )
    .unwrap();

    // in-query shape: bob sees only the public row
    let in_query = acl::build_acl_filter(&conn, &bob, Permission::Read, 200).unwrap();
    assert!(!in_query.is_post_query());
    let page = query::list_resources(
        &conn,
        KIND,
        &ListFilter::default(),
        &in_query,
        20,
        None,
        None,
    )
    .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].acl_id, None);

    // post-query shape: same visibility with a zero cutoff
    let post = acl::build_acl_filter(&conn, &alice, Permission::Read, 0).unwrap();
    assert!(post.is_post_query());
    let page = query::list_resources(
        &conn,
        KIND,
        &ListFilter::default(),
        &post,
        20,
        None,
        None,
    )
    .unwrap();
    assert_eq!(page.items.len(), 2);
}
