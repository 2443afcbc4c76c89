// tests/common/mod.rs

//! Shared helpers for integration tests
#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use trellis::db::models::TypeCategory;
use trellis::{AclEntry, Permission, PrincipalSet, PrincipalType};

/// A well-formed chain handle that no row will ever carry
pub const ABSENT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Fresh migrated database backed by a throwaway file
pub fn test_db() -> (tempfile::TempPath, Connection) {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.into_temp_path();
    let db_path = path.to_str().unwrap().to_string();
    std::fs::remove_file(&db_path).ok();

    trellis::db::init(&db_path).unwrap();
    let conn = trellis::db::open(&db_path).unwrap();
    (path, conn)
}

/// Register a schemaless entity type and return its id
pub fn entity_type(conn: &Connection, name: &str) -> String {
    trellis::store::create_type(conn, name, TypeCategory::Entity, None, None, Some("root"), 0)
        .unwrap()
        .id
}

/// Register a schemaless link type and return its id
pub fn link_type(conn: &Connection, name: &str) -> String {
    trellis::store::create_type(conn, name, TypeCategory::Link, None, None, Some("root"), 0)
        .unwrap()
        .id
}

/// Register an entity type whose properties must match the given schema
pub fn entity_type_with_schema(
    conn: &Connection,
    name: &str,
    schema: &serde_json::Value,
) -> String {
    trellis::store::create_type(
        conn,
        name,
        TypeCategory::Entity,
        None,
        Some(schema),
        Some("root"),
        0,
    )
    .unwrap()
    .id
}

/// A user principal with no group memberships
pub fn actor(user: &str) -> PrincipalSet {
    PrincipalSet {
        user_id: Some(user.to_string()),
        groups: Vec::new(),
    }
}

pub fn anonymous() -> PrincipalSet {
    PrincipalSet::anonymous()
}

/// ACL granting write (and therefore read) to one user
pub fn write_acl(user: &str) -> Vec<AclEntry> {
    vec![AclEntry {
        principal_type: PrincipalType::User,
        principal_id: user.to_string(),
        permission: Permission::Write,
    }]
}

/// Inputs for a plain entity create
pub fn new_entity(type_id: &str, properties: serde_json::Value, acl: Vec<AclEntry>) -> trellis::store::NewResource {
    trellis::store::NewResource {
        type_id: type_id.to_string(),
        properties,
        acl_entries: acl,
        source_entity_id: None,
        target_entity_id: None,
    }
}

/// Inputs for a link create
pub fn new_link(
    type_id: &str,
    source: &str,
    target: &str,
    acl: Vec<AclEntry>,
) -> trellis::store::NewResource {
    trellis::store::NewResource {
        type_id: type_id.to_string(),
        properties: json!({}),
        acl_entries: acl,
        source_entity_id: Some(source.to_string()),
        target_entity_id: Some(target.to_string()),
    }
}
