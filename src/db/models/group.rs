// src/db/models/group.rs

//! Group and membership models
//!
//! Groups contain users and other groups. The membership table forms a
//! DAG; cycle rejection happens in the ACL engine before insert.

use super::PrincipalType;
use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// A principal group
#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

impl Group {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO groups (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![&self.id, &self.name, &self.description, self.created_at],
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Group>> {
        let row = conn
            .query_row(
                "SELECT id, name, description, created_at FROM groups WHERE id = ?1",
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Group>> {
        let mut stmt =
            conn.prepare("SELECT id, name, description, created_at FROM groups ORDER BY name")?;
        let rows = stmt.query_map([], Self::from_row)?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }
}

/// One membership edge: `member` belongs to `group_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub group_id: String,
    pub member_type: PrincipalType,
    pub member_id: String,
}

impl GroupMember {
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, member_type, member_id)
             VALUES (?1, ?2, ?3)",
            params![&self.group_id, self.member_type.as_str(), &self.member_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, conn: &Connection) -> Result<bool> {
        let affected = conn.execute(
            "DELETE FROM group_members
             WHERE group_id = ?1 AND member_type = ?2 AND member_id = ?3",
            params![&self.group_id, self.member_type.as_str(), &self.member_id],
        )?;
        Ok(affected > 0)
    }

    /// Direct members of a group
    pub fn list_for_group(conn: &Connection, group_id: &str) -> Result<Vec<GroupMember>> {
        let mut stmt = conn.prepare(
            "SELECT group_id, member_type, member_id FROM group_members
             WHERE group_id = ?1
             ORDER BY member_type, member_id",
        )?;
        let rows = stmt.query_map([group_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut members = Vec::new();
        for row in rows {
            let (group_id, mtype, member_id) = row?;
            members.push(GroupMember {
                group_id,
                member_type: PrincipalType::from_str(&mtype)
                    .map_err(crate::error::Error::Internal)?,
                member_id,
            });
        }
        Ok(members)
    }

    /// Groups that directly contain the given principal
    pub fn groups_containing(
        conn: &Connection,
        member_type: PrincipalType,
        member_id: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT group_id FROM group_members WHERE member_type = ?1 AND member_id = ?2",
        )?;
        let rows = stmt.query_map(params![member_type.as_str(), member_id], |row| row.get(0))?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    /// Group ids directly contained in the given group
    pub fn contained_groups(conn: &Connection, group_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT member_id FROM group_members WHERE group_id = ?1 AND member_type = 'group'",
        )?;
        let rows = stmt.query_map([group_id], |row| row.get(0))?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }
}
