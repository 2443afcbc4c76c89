// src/acl/mod.rs

//! Access control engine
//!
//! ACLs are content-addressed: the canonical sorted entry set is hashed
//! and deduplicated, so two resources sharing the same grants share one
//! ACL row. Permission checks resolve the caller to a principal closure
//! (the user plus every group reachable through the membership DAG) and
//! test ACL entries against that set.
//!
//! A null acl_id means the resource is readable by any caller; write is
//! only ever granted by an explicit ACL entry.

pub mod groups;

use crate::db::models::{Acl, AclEntry, Group, GroupMember, Permission, PrincipalType};
use crate::error::{Error, Result};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Default cutoff between the in-query and post-query filter shapes
pub const DEFAULT_FILTER_CUTOFF: usize = 200;

/// Hop bound for membership closure, guards against pathological data
const MAX_CLOSURE_DEPTH: usize = 1000;

/// The caller's resolved identity: the user plus every group the user is
/// a transitive member of
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalSet {
    pub user_id: Option<String>,
    pub groups: Vec<String>,
}

impl PrincipalSet {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Whether an ACL entry names a principal the caller is
    pub fn matches(&self, entry: &AclEntry) -> bool {
        match entry.principal_type {
            PrincipalType::User => self.user_id.as_deref() == Some(entry.principal_id.as_str()),
            PrincipalType::Group => self.groups.iter().any(|g| g == &entry.principal_id),
        }
    }
}

/// Resolve a user to its principal closure by breadth-first walk over
/// the group-membership DAG
pub fn resolve_principals(conn: &Connection, user_id: &str) -> Result<PrincipalSet> {
    let mut groups: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(PrincipalType, String)> = VecDeque::new();
    queue.push_back((PrincipalType::User, user_id.to_string()));

    let mut hops = 0usize;
    while let Some((ptype, pid)) = queue.pop_front() {
        hops += 1;
        if hops > MAX_CLOSURE_DEPTH {
            return Err(Error::Internal(format!(
                "membership closure exceeded {} hops for user {}",
                MAX_CLOSURE_DEPTH, user_id
            )));
        }
        for group_id in GroupMember::groups_containing(conn, ptype, &pid)? {
            if visited.insert(group_id.clone()) {
                groups.push(group_id.clone());
                queue.push_back((PrincipalType::Group, group_id));
            }
        }
    }

    groups.sort();
    Ok(PrincipalSet {
        user_id: Some(user_id.to_string()),
        groups,
    })
}

/// ACL ids whose entry set grants `required` to the principal set
pub fn accessible_acl_ids(
    conn: &Connection,
    principals: &PrincipalSet,
    required: Permission,
) -> Result<HashSet<i64>> {
    let mut ids = HashSet::new();
    let Some(user_id) = principals.user_id.as_deref() else {
        return Ok(ids);
    };

    // write implies read: a read requirement accepts either permission
    let perm_clause = match required {
        Permission::Read => "permission IN ('read', 'write')",
        Permission::Write => "permission = 'write'",
    };

    let mut sql = format!(
        "SELECT DISTINCT acl_id FROM acl_entries
         WHERE {perm_clause} AND (
             (principal_type = 'user' AND principal_id = ?1)"
    );
    let mut params: Vec<rusqlite::types::Value> = vec![user_id.to_string().into()];
    if !principals.groups.is_empty() {
        let placeholders: Vec<String> = (0..principals.groups.len())
            .map(|i| format!("?{}", i + 2))
            .collect();
        sql.push_str(&format!(
            " OR (principal_type = 'group' AND principal_id IN ({}))",
            placeholders.join(", ")
        ));
        for group in &principals.groups {
            params.push(group.clone().into());
        }
    }
    sql.push(')');

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| row.get(0))?;
    for row in rows {
        ids.insert(row?);
    }
    Ok(ids)
}

/// How a listing query applies the caller's accessible-ACL set
#[derive(Debug, Clone)]
pub enum AclFilterShape {
    /// Small set: fold into the WHERE clause as bound parameters
    InQuery(Vec<i64>),
    /// Large set: no WHERE contribution, caller over-samples and filters
    /// rows against the in-memory set
    PostQuery(HashSet<i64>),
}

/// A permission filter usable either inside SQL or row-by-row
#[derive(Debug, Clone)]
pub struct AclFilter {
    required: Permission,
    shape: AclFilterShape,
}

impl AclFilter {
    pub fn required(&self) -> Permission {
        self.required
    }

    pub fn is_post_query(&self) -> bool {
        matches!(self.shape, AclFilterShape::PostQuery(_))
    }

    /// WHERE contribution for the in-query shape, None for post-query
    ///
    /// Null acl_id passes read filters (public read) but never write.
    pub fn where_clause(&self, column: &str) -> Option<(String, Vec<i64>)> {
        match &self.shape {
            AclFilterShape::PostQuery(_) => None,
            AclFilterShape::InQuery(ids) => {
                let null_arm = match self.required {
                    Permission::Read => format!("{column} IS NULL"),
                    Permission::Write => "0".to_string(),
                };
                if ids.is_empty() {
                    return Some((format!("({null_arm})"), Vec::new()));
                }
                let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
                Some((
                    format!(
                        "({null_arm} OR {column} IN ({}))",
                        placeholders.join(", ")
                    ),
                    ids.clone(),
                ))
            }
        }
    }

    /// Row-by-row check, valid in both shapes
    pub fn allows_row(&self, acl_id: Option<i64>) -> bool {
        match acl_id {
            None => self.required == Permission::Read,
            Some(id) => match &self.shape {
                AclFilterShape::InQuery(ids) => ids.contains(&id),
                AclFilterShape::PostQuery(ids) => ids.contains(&id),
            },
        }
    }
}

/// Build the two-shape ACL filter for a principal set
///
/// Sets no larger than `cutoff` become bound-parameter IN lists; larger
/// sets fall back to post-query filtering over an over-sampled page.
pub fn build_acl_filter(
    conn: &Connection,
    principals: &PrincipalSet,
    required: Permission,
    cutoff: usize,
) -> Result<AclFilter> {
    let accessible = accessible_acl_ids(conn, principals, required)?;
    let shape = if accessible.len() <= cutoff {
        let mut ids: Vec<i64> = accessible.into_iter().collect();
        ids.sort_unstable();
        AclFilterShape::InQuery(ids)
    } else {
        debug!(
            accessible = accessible.len(),
            cutoff, "ACL filter falling back to post-query shape"
        );
        AclFilterShape::PostQuery(accessible)
    };
    Ok(AclFilter { required, shape })
}

/// Point permission check for a single resource
pub fn has_permission(
    conn: &Connection,
    principals: &PrincipalSet,
    acl_id: Option<i64>,
    required: Permission,
) -> Result<bool> {
    let Some(acl_id) = acl_id else {
        // public read; write only ever comes from an explicit ACL
        return Ok(required == Permission::Read);
    };

    let entries = Acl::entries(conn, acl_id)?;
    Ok(entries
        .iter()
        .any(|entry| entry.permission.satisfies(required) && principals.matches(entry)))
}

/// Sort and dedupe an entry list into its canonical form
pub fn canonicalize_entries(entries: &[AclEntry]) -> Vec<AclEntry> {
    let mut canonical = entries.to_vec();
    canonical.sort_by(|a, b| {
        (a.principal_type, &a.principal_id, a.permission)
            .cmp(&(b.principal_type, &b.principal_id, b.permission))
    });
    canonical.dedup();
    canonical
}

/// Stable fingerprint over a canonical entry list
pub fn fingerprint_entries(canonical: &[AclEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in canonical {
        hasher.update(entry.principal_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(entry.principal_id.as_bytes());
        hasher.update(b":");
        hasher.update(entry.permission.as_str().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Resolve-or-create the ACL row for an entry list
///
/// Returns None for an empty canonical set (null acl_id, public read).
/// At most one row exists per logical entry set.
pub fn get_or_create_acl(
    conn: &Connection,
    entries: &[AclEntry],
    now: i64,
) -> Result<Option<i64>> {
    for entry in entries {
        if entry.principal_id.trim().is_empty() {
            return Err(Error::InvalidAcl("empty principal id".into()));
        }
        if entry.principal_type == PrincipalType::Group
            && Group::find_by_id(conn, &entry.principal_id)?.is_none()
        {
            return Err(Error::InvalidPrincipals(format!(
                "group {} does not exist",
                entry.principal_id
            )));
        }
    }

    let canonical = canonicalize_entries(entries);
    if canonical.is_empty() {
        return Ok(None);
    }

    let fingerprint = fingerprint_entries(&canonical);
    if let Some(acl) = Acl::find_by_fingerprint(conn, &fingerprint)? {
        return Ok(Some(acl.id));
    }

    match Acl::insert(conn, &fingerprint, &canonical, now) {
        Ok(id) => Ok(Some(id)),
        // another writer inserted the same fingerprint first
        Err(Error::Database(rusqlite::Error::SqliteFailure(e, _)))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let acl = Acl::find_by_fingerprint(conn, &fingerprint)?
                .ok_or_else(|| Error::Internal("ACL vanished after conflict".into()))?;
            Ok(Some(acl.id))
        }
        Err(e) => Err(e),
    }
}
