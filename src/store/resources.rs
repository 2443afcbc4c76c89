// src/store/resources.rs

//! CRUD-with-versioning for entities and links
//!
//! Reads resolve any chain handle through the version chain engine and
//! gate on the row's ACL. Writes demote the current latest row and
//! insert the successor inside one transaction; the demote is
//! conditional on `is_latest = 1` so a concurrent writer loses with a
//! conflict error rather than forking the chain.

use crate::acl::{self, PrincipalSet};
use crate::chain;
use crate::db;
use crate::db::models::{AclEntry, Permission, ResourceKind, ResourceRow, TypeDef};
use crate::error::{Error, Result};
use crate::validate::{self, validate_resource_id};
use rusqlite::Connection;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Inputs for creating an entity or link
#[derive(Debug, Clone)]
pub struct NewResource {
    pub type_id: String,
    pub properties: Value,
    pub acl_entries: Vec<AclEntry>,
    /// Source chain id, links only
    pub source_entity_id: Option<String>,
    /// Target chain id, links only
    pub target_entity_id: Option<String>,
}

fn audit(op: &str, kind: ResourceKind, row: &ResourceRow, actor: &PrincipalSet) {
    info!(
        target: "audit",
        op,
        kind = kind.as_str(),
        id = %row.id,
        version = row.version,
        actor = actor.user_id.as_deref().unwrap_or("-"),
    );
}

fn type_for(conn: &Connection, kind: ResourceKind, type_id: &str) -> Result<TypeDef> {
    let type_def =
        TypeDef::find_by_id(conn, type_id)?.ok_or_else(|| Error::TypeNotFound(type_id.to_string()))?;
    if type_def.category.as_str() != kind.as_str() {
        return Err(Error::validation(
            "type_id",
            format!(
                "type {} is a {} type, not a {} type",
                type_id,
                type_def.category.as_str(),
                kind.as_str()
            ),
        ));
    }
    Ok(type_def)
}

fn check_read(conn: &Connection, actor: &PrincipalSet, row: &ResourceRow) -> Result<()> {
    if acl::has_permission(conn, actor, row.acl_id, Permission::Read)? {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("read denied on {}", row.id)))
    }
}

fn check_write(conn: &Connection, actor: &PrincipalSet, row: &ResourceRow) -> Result<()> {
    if acl::has_permission(conn, actor, row.acl_id, Permission::Write)? {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("write denied on {}", row.id)))
    }
}

/// Create a v1 row, persisting its ACL content-addressed
pub fn create(
    conn: &mut Connection,
    kind: ResourceKind,
    req: &NewResource,
    actor: &PrincipalSet,
    now: i64,
) -> Result<ResourceRow> {
    let type_def = type_for(conn, kind, &req.type_id)?;
    validate::validate_properties(type_def.json_schema.as_deref(), &req.properties)?
        .into_result()?;

    if kind == ResourceKind::Link {
        let source = req
            .source_entity_id
            .as_deref()
            .ok_or_else(|| Error::validation("source_entity_id", "link requires source_entity_id"))?;
        let target = req
            .target_entity_id
            .as_deref()
            .ok_or_else(|| Error::validation("target_entity_id", "link requires target_entity_id"))?;
        validate_resource_id("source_entity_id", source)?;
        validate_resource_id("target_entity_id", target)?;
        // both endpoint chains must resolve
        chain::find_latest(conn, ResourceKind::Entity, source)?
            .ok_or_else(|| Error::NotFound(format!("source entity {}", source)))?;
        chain::find_latest(conn, ResourceKind::Entity, target)?
            .ok_or_else(|| Error::NotFound(format!("target entity {}", target)))?;
    }

    let properties_text = serde_json::to_string(&req.properties)?;
    let row = db::transaction(conn, |tx| {
        let acl_id = acl::get_or_create_acl(tx, &req.acl_entries, now)?;
        let row = ResourceRow {
            id: Uuid::new_v4().to_string(),
            kind,
            type_id: req.type_id.clone(),
            properties: properties_text.clone(),
            version: 1,
            previous_version_id: None,
            created_at: now,
            created_by: actor.user_id.clone(),
            is_deleted: false,
            is_latest: true,
            acl_id,
            source_entity_id: req.source_entity_id.clone(),
            target_entity_id: req.target_entity_id.clone(),
        };
        row.insert(tx)?;
        Ok(row)
    })?;

    audit("create", kind, &row, actor);
    Ok(row)
}

/// Read the latest row of the chain containing `id`
///
/// Soft-deleted chains read as NotFound unless `include_deleted`.
pub fn get_latest(
    conn: &Connection,
    kind: ResourceKind,
    id: &str,
    actor: &PrincipalSet,
    include_deleted: bool,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    let row = chain::find_latest(conn, kind, id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_read(conn, actor, &row)?;
    if row.is_deleted && !include_deleted {
        return Err(Error::NotFound(id.to_string()));
    }
    Ok(row)
}

/// Read version `n` of the chain containing `id`
pub fn get_version(
    conn: &Connection,
    kind: ResourceKind,
    id: &str,
    n: i64,
    actor: &PrincipalSet,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    if n < 1 {
        return Err(Error::InvalidVersion {
            chain_id: id.to_string(),
            requested: n,
        });
    }
    match chain::find_version(conn, kind, id, n)? {
        Some(row) => {
            check_read(conn, actor, &row)?;
            Ok(row)
        }
        None => {
            // distinguish a missing chain from a bad version number
            if chain::find_latest(conn, kind, id)?.is_some() {
                Err(Error::InvalidVersion {
                    chain_id: id.to_string(),
                    requested: n,
                })
            } else {
                Err(Error::NotFound(id.to_string()))
            }
        }
    }
}

/// The full chain, ascending by version, gated on the latest row's ACL
pub fn list_versions(
    conn: &Connection,
    kind: ResourceKind,
    id: &str,
    actor: &PrincipalSet,
) -> Result<Vec<ResourceRow>> {
    validate_resource_id("id", id)?;
    let rows = chain::list_chain(conn, kind, id)?;
    let latest = rows
        .last()
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_read(conn, actor, latest)?;
    Ok(rows)
}

/// Demote the current latest row and insert its successor
///
/// The conditional demote detects a lost writer race; remaining stale
/// leaves from earlier races are swept in the same transaction.
fn bump_version<F>(
    conn: &mut Connection,
    kind: ResourceKind,
    current: &ResourceRow,
    now: i64,
    actor: &PrincipalSet,
    mutate: F,
) -> Result<ResourceRow>
where
    F: FnOnce(&mut ResourceRow),
{
    let mut next = ResourceRow {
        id: Uuid::new_v4().to_string(),
        kind,
        type_id: current.type_id.clone(),
        properties: current.properties.clone(),
        version: current.version + 1,
        previous_version_id: Some(current.id.clone()),
        created_at: now,
        created_by: actor.user_id.clone(),
        is_deleted: current.is_deleted,
        is_latest: true,
        // carried verbatim; only the set-ACL operation changes it
        acl_id: current.acl_id,
        source_entity_id: current.source_entity_id.clone(),
        target_entity_id: current.target_entity_id.clone(),
    };
    mutate(&mut next);

    let current_id = current.id.clone();
    db::transaction(conn, |tx| {
        let demoted = tx.execute(
            &format!(
                "UPDATE {} SET is_latest = 0 WHERE id = ?1 AND is_latest = 1",
                kind.table()
            ),
            [&current_id],
        )?;
        if demoted != 1 {
            return Err(Error::WriteConflict(current_id.clone()));
        }

        // sweep stale leaves left by an earlier unresolved race
        for stale_id in chain::chain_ids(tx, kind, &current_id)? {
            if stale_id != current_id {
                tx.execute(
                    &format!(
                        "UPDATE {} SET is_latest = 0 WHERE id = ?1 AND is_latest = 1",
                        kind.table()
                    ),
                    [&stale_id],
                )?;
            }
        }

        next.insert(tx)?;
        Ok(())
    })?;

    Ok(next)
}

/// Replace the property bag, emitting a new version
pub fn update(
    conn: &mut Connection,
    kind: ResourceKind,
    id: &str,
    properties: &Value,
    actor: &PrincipalSet,
    now: i64,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    let current = chain::find_latest(conn, kind, id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_write(conn, actor, &current)?;
    if current.is_deleted {
        return Err(Error::ResourceDeleted(id.to_string()));
    }

    let type_def = type_for(conn, kind, &current.type_id)?;
    validate::validate_properties(type_def.json_schema.as_deref(), properties)?.into_result()?;
    let properties_text = serde_json::to_string(properties)?;

    let row = bump_version(conn, kind, &current, now, actor, |next| {
        next.properties = properties_text.clone();
    })?;
    audit("update", kind, &row, actor);
    Ok(row)
}

/// Soft-delete: a new version with `is_deleted = true`
pub fn soft_delete(
    conn: &mut Connection,
    kind: ResourceKind,
    id: &str,
    actor: &PrincipalSet,
    now: i64,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    let current = chain::find_latest(conn, kind, id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_write(conn, actor, &current)?;
    if current.is_deleted {
        return Err(Error::AlreadyDeleted(id.to_string()));
    }

    let row = bump_version(conn, kind, &current, now, actor, |next| {
        next.is_deleted = true;
    })?;
    audit("delete", kind, &row, actor);
    Ok(row)
}

/// Restore: a new version with `is_deleted = false`
pub fn restore(
    conn: &mut Connection,
    kind: ResourceKind,
    id: &str,
    actor: &PrincipalSet,
    now: i64,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    let current = chain::find_latest(conn, kind, id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_write(conn, actor, &current)?;
    if !current.is_deleted {
        return Err(Error::NotDeleted(id.to_string()));
    }

    let row = bump_version(conn, kind, &current, now, actor, |next| {
        next.is_deleted = false;
    })?;
    audit("restore", kind, &row, actor);
    Ok(row)
}

/// Attach a (content-addressed) ACL, emitting a new version
pub fn set_acl(
    conn: &mut Connection,
    kind: ResourceKind,
    id: &str,
    entries: &[AclEntry],
    actor: &PrincipalSet,
    now: i64,
) -> Result<ResourceRow> {
    validate_resource_id("id", id)?;
    let current = chain::find_latest(conn, kind, id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    check_write(conn, actor, &current)?;
    if current.is_deleted {
        return Err(Error::ResourceDeleted(id.to_string()));
    }

    let acl_id = acl::get_or_create_acl(conn, entries, now)?;
    let row = bump_version(conn, kind, &current, now, actor, |next| {
        next.acl_id = acl_id;
    })?;
    audit("set_acl", kind, &row, actor);
    Ok(row)
}
