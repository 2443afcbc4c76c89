// src/db/models/acl.rs

//! ACL row models
//!
//! An ACL is content-addressed: one row per distinct canonical entry set,
//! identified by a fingerprint over the sorted entries. Entry rows attach
//! principals (users or groups) with a read or write permission.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Permission level carried by an ACL entry
///
/// Ordered so that `write` satisfies a `read` requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }

    /// Whether an entry with this permission satisfies `required`
    pub fn satisfies(&self, required: Permission) -> bool {
        *self >= required
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            _ => Err(format!("Invalid permission: {}", s)),
        }
    }
}

/// Kind of principal named by an ACL entry or group member
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Group,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "user",
            PrincipalType::Group => "group",
        }
    }
}

impl FromStr for PrincipalType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(PrincipalType::User),
            "group" => Ok(PrincipalType::Group),
            _ => Err(format!("Invalid principal type: {}", s)),
        }
    }
}

/// One principal-permission attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal_type: PrincipalType,
    pub principal_id: String,
    pub permission: Permission,
}

/// A content-addressed ACL record
#[derive(Debug, Clone)]
pub struct Acl {
    pub id: i64,
    pub fingerprint: String,
    pub created_at: i64,
}

impl Acl {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    pub fn find_by_fingerprint(conn: &Connection, fingerprint: &str) -> Result<Option<Acl>> {
        let row = conn
            .query_row(
                "SELECT id, fingerprint, created_at FROM acls WHERE fingerprint = ?1",
                [fingerprint],
                Self::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert an ACL row and its entries, returning the new id
    pub fn insert(
        conn: &Connection,
        fingerprint: &str,
        entries: &[AclEntry],
        created_at: i64,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO acls (fingerprint, created_at) VALUES (?1, ?2)",
            params![fingerprint, created_at],
        )?;
        let acl_id = conn.last_insert_rowid();

        for entry in entries {
            conn.execute(
                "INSERT INTO acl_entries (acl_id, principal_type, principal_id, permission)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    acl_id,
                    entry.principal_type.as_str(),
                    &entry.principal_id,
                    entry.permission.as_str(),
                ],
            )?;
        }

        Ok(acl_id)
    }

    /// Load the entry set for an ACL id
    pub fn entries(conn: &Connection, acl_id: i64) -> Result<Vec<AclEntry>> {
        let mut stmt = conn.prepare(
            "SELECT principal_type, principal_id, permission FROM acl_entries
             WHERE acl_id = ?1
             ORDER BY principal_type, principal_id, permission",
        )?;
        let rows = stmt.query_map([acl_id], |row| {
            let ptype: String = row.get(0)?;
            let perm: String = row.get(2)?;
            Ok((ptype, row.get::<_, String>(1)?, perm))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (ptype, pid, perm) = row?;
            entries.push(AclEntry {
                principal_type: PrincipalType::from_str(&ptype)
                    .map_err(crate::error::Error::Internal)?,
                principal_id: pid,
                permission: Permission::from_str(&perm)
                    .map_err(crate::error::Error::Internal)?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_satisfies_read() {
        assert!(Permission::Write.satisfies(Permission::Read));
        assert!(Permission::Write.satisfies(Permission::Write));
        assert!(Permission::Read.satisfies(Permission::Read));
        assert!(!Permission::Read.satisfies(Permission::Write));
    }

    #[test]
    fn test_permission_round_trip() {
        for perm in [Permission::Read, Permission::Write] {
            assert_eq!(Permission::from_str(perm.as_str()).unwrap(), perm);
        }
        assert!(Permission::from_str("admin").is_err());
    }
}
