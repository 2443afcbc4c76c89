// tests/acl.rs

//! ACL and group integration tests: membership cycles, transitive
//! grants on stored resources, closure caching semantics.

mod common;

use common::{actor, entity_type, new_entity};
use serde_json::json;
use trellis::acl::{self, groups};
use trellis::{AclEntry, Error, Permission, PrincipalType, ResourceKind, store};

#[test]
fn test_group_cycle_rejected_without_insert() {
    let (_path, conn) = common::test_db();

    let a = groups::create_group(&conn, "a", None, 0).unwrap();
    let b = groups::create_group(&conn, "b", None, 0).unwrap();
    let c = groups::create_group(&conn, "c", None, 0).unwrap();

    groups::add_member(&conn, &a.id, PrincipalType::Group, &b.id).unwrap();
    groups::add_member(&conn, &b.id, PrincipalType::Group, &c.id).unwrap();

    assert!(matches!(
        groups::add_member(&conn, &a.id, PrincipalType::Group, &a.id),
        Err(Error::GroupCycle { .. })
    ));
    assert!(matches!(
        groups::add_member(&conn, &c.id, PrincipalType::Group, &a.id),
        Err(Error::GroupCycle { .. })
    ));

    let edge_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM group_members", [], |row| row.get(0))
        .unwrap();
    assert_eq!(edge_count, 2);
}

#[test]
fn test_group_grant_reaches_nested_members() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");

    let eng = groups::create_group(&conn, "engineering", None, 0).unwrap();
    let core = groups::create_group(&conn, "core", None, 0).unwrap();
    groups::add_member(&conn, &eng.id, PrincipalType::Group, &core.id).unwrap();
    groups::add_member(&conn, &core.id, PrincipalType::User, "carol").unwrap();

    let owner = actor("owner");
    let entries = vec![
        AclEntry {
            principal_type: PrincipalType::User,
            principal_id: "owner".into(),
            permission: Permission::Write,
        },
        AclEntry {
            principal_type: PrincipalType::Group,
            principal_id: eng.id.clone(),
            permission: Permission::Read,
        },
    ];
    let row = store::create(
        &mut conn,
        ResourceKind::Entity,
        &new_entity(&type_id, json!({"secret": false}), entries),
        &owner,
        100,
    )
    .unwrap();

    // carol reaches the resource through core -> engineering
    let carol = acl::resolve_principals(&conn, "carol").unwrap();
    assert!(carol.groups.contains(&eng.id));
    assert!(carol.groups.contains(&core.id));
    let read = store::get_latest(&conn, ResourceKind::Entity, &row.id, &carol, false).unwrap();
    assert_eq!(read.id, row.id);

    // read grant does not leak into write
    assert!(matches!(
        store::update(&mut conn, ResourceKind::Entity, &row.id, &json!({}), &carol, 101),
        Err(Error::Forbidden(_))
    ));

    // an unrelated user sees nothing
    let mallory = acl::resolve_principals(&conn, "mallory").unwrap();
    assert!(matches!(
        store::get_latest(&conn, ResourceKind::Entity, &row.id, &mallory, false),
        Err(Error::Forbidden(_))
    ));
}

#[test]
fn test_membership_removal_revokes_transitive_access() {
    let (_path, mut conn) = common::test_db();
    let type_id = entity_type(&conn, "doc");

    let team = groups::create_group(&conn, "team", None, 0).unwrap();
    groups::add_member(&conn, &team.id, PrincipalType::User, "dave").unwrap();

    let owner = actor("owner");
    let entries = vec![AclEntry {
        principal_type: PrincipalType::Group,
        principal_id: team.id.clone(),
        permission: Permission::Write,
    }];
    let row = store::create(
        &mut conn,
        ResourceKind::Entity,
        &new_entity(&type_id, json!({}), entries),
        &owner,
        100,
    )
    .unwrap();

    let dave = acl::resolve_principals(&conn, "dave").unwrap();
    store::update(&mut conn, ResourceKind::Entity, &row.id, &json!({"n": 1}), &dave, 101).unwrap();

    groups::remove_member(&conn, &team.id, PrincipalType::User, "dave").unwrap();
    let dave_after = acl::resolve_principals(&conn, "dave").unwrap();
    assert!(dave_after.groups.is_empty());
    assert!(matches!(
        store::update(&mut conn, ResourceKind::Entity, &row.id, &json!({"n": 2}), &dave_after, 102),
        Err(Error::Forbidden(_))
    ));
}

#[test]
fn test_accessible_set_matches_point_checks() {
    let (_path, conn) = common::test_db();

    let team = groups::create_group(&conn, "team", None, 0).unwrap();
    groups::add_member(&conn, &team.id, PrincipalType::User, "erin").unwrap();

    let read_entries = vec![AclEntry {
        principal_type: PrincipalType::Group,
        principal_id: team.id.clone(),
        permission: Permission::Read,
    }];
    let write_entries = vec![AclEntry {
        principal_type: PrincipalType::User,
        principal_id: "erin".into(),
        permission: Permission::Write,
    }];
    let read_acl = acl::get_or_create_acl(&conn, &read_entries, 0).unwrap().unwrap();
    let write_acl = acl::get_or_create_acl(&conn, &write_entries, 0).unwrap().unwrap();

    let erin = acl::resolve_principals(&conn, "erin").unwrap();
    let readable = acl::accessible_acl_ids(&conn, &erin, Permission::Read).unwrap();
    assert!(readable.contains(&read_acl));
    assert!(readable.contains(&write_acl));

    let writable = acl::accessible_acl_ids(&conn, &erin, Permission::Write).unwrap();
    assert!(!writable.contains(&read_acl));
    assert!(writable.contains(&write_acl));

    for acl_id in readable {
        assert!(acl::has_permission(&conn, &erin, Some(acl_id), Permission::Read).unwrap());
    }
}
