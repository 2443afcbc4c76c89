// src/db/schema.rs

//! Database schema definitions and migrations for Trellis
//!
//! This module defines the SQLite schema for all core tables and provides
//! a migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    // Apply migrations in order
    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables for Trellis:
/// - types: Entity/link type registry with optional JSON Schemas
/// - acls / acl_entries: Content-addressed access control lists
/// - groups / group_members: Principal groups forming a DAG
/// - entities: Versioned node rows
/// - links: Versioned directed edge rows
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Types: registry of entity and link types, immutable once created
        CREATE TABLE types (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL CHECK(category IN ('entity', 'link')),
            description TEXT,
            json_schema TEXT,
            created_at INTEGER NOT NULL,
            created_by TEXT
        );

        -- ACLs: one row per distinct canonical entry set
        CREATE TABLE acls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX idx_acls_fingerprint ON acls(fingerprint);

        CREATE TABLE acl_entries (
            acl_id INTEGER NOT NULL,
            principal_type TEXT NOT NULL CHECK(principal_type IN ('user', 'group')),
            principal_id TEXT NOT NULL,
            permission TEXT NOT NULL CHECK(permission IN ('read', 'write')),
            PRIMARY KEY (acl_id, principal_type, principal_id, permission),
            FOREIGN KEY (acl_id) REFERENCES acls(id)
        );

        CREATE INDEX idx_acl_entries_principal
            ON acl_entries(principal_type, principal_id, permission);

        -- Groups: principals that can contain users and other groups
        CREATE TABLE groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE group_members (
            group_id TEXT NOT NULL,
            member_type TEXT NOT NULL CHECK(member_type IN ('user', 'group')),
            member_id TEXT NOT NULL,
            PRIMARY KEY (group_id, member_type, member_id),
            FOREIGN KEY (group_id) REFERENCES groups(id)
        );

        CREATE INDEX idx_group_members_member
            ON group_members(member_type, member_id);

        -- Entities: versioned node rows; a logical entity is the chain of
        -- rows linked by previous_version_id, exactly one flagged is_latest
        CREATE TABLE entities (
            id TEXT PRIMARY KEY,
            type_id TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 1,
            previous_version_id TEXT,
            created_at INTEGER NOT NULL,
            created_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            is_latest INTEGER NOT NULL DEFAULT 1,
            acl_id INTEGER,
            FOREIGN KEY (type_id) REFERENCES types(id),
            FOREIGN KEY (acl_id) REFERENCES acls(id)
        );

        CREATE INDEX idx_entities_latest ON entities(is_latest, is_deleted);
        CREATE INDEX idx_entities_type ON entities(type_id);
        CREATE INDEX idx_entities_prev ON entities(previous_version_id);
        CREATE INDEX idx_entities_acl ON entities(acl_id);
        CREATE INDEX idx_entities_created ON entities(created_at, id);

        -- Links: versioned directed edges; source/target store a chain id
        -- (the id of some row in the endpoint's chain, not necessarily the
        -- latest) and are resolved through the version chain engine
        CREATE TABLE links (
            id TEXT PRIMARY KEY,
            type_id TEXT NOT NULL,
            source_entity_id TEXT NOT NULL,
            target_entity_id TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 1,
            previous_version_id TEXT,
            created_at INTEGER NOT NULL,
            created_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            is_latest INTEGER NOT NULL DEFAULT 1,
            acl_id INTEGER,
            FOREIGN KEY (type_id) REFERENCES types(id),
            FOREIGN KEY (acl_id) REFERENCES acls(id)
        );

        CREATE INDEX idx_links_latest ON links(is_latest, is_deleted);
        CREATE INDEX idx_links_type ON links(type_id);
        CREATE INDEX idx_links_prev ON links(previous_version_id);
        CREATE INDEX idx_links_acl ON links(acl_id);
        CREATE INDEX idx_links_source ON links(source_entity_id, is_latest);
        CREATE INDEX idx_links_target ON links(target_entity_id, is_latest);
        CREATE INDEX idx_links_created ON links(created_at, id);
        ",
    )?;

    debug!("Schema version 1 created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrate_fresh_database() {
        let conn = test_conn();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = test_conn();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_core_tables_exist() {
        let conn = test_conn();
        for table in [
            "types",
            "acls",
            "acl_entries",
            "groups",
            "group_members",
            "entities",
            "links",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
