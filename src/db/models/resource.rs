// src/db/models/resource.rs

//! Versioned resource rows shared by entities and links
//!
//! Both tables carry the same version-chain columns; links add the two
//! endpoint chain ids. A logical resource is the chain of rows connected
//! by previous_version_id, with exactly one row flagged is_latest.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Which versioned table a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Entity,
    Link,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Entity => "entity",
            ResourceKind::Link => "link",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Entity => "entities",
            ResourceKind::Link => "links",
        }
    }

    /// Column list for SELECTs mapped by [`ResourceRow::from_row`]
    ///
    /// Entities select NULL endpoints so both kinds share one row mapper.
    pub fn select_columns(&self) -> &'static str {
        match self {
            ResourceKind::Entity => {
                "id, type_id, properties, version, previous_version_id, \
                 created_at, created_by, is_deleted, is_latest, acl_id, \
                 NULL AS source_entity_id, NULL AS target_entity_id"
            }
            ResourceKind::Link => {
                "id, type_id, properties, version, previous_version_id, \
                 created_at, created_by, is_deleted, is_latest, acl_id, \
                 source_entity_id, target_entity_id"
            }
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "entity" => Ok(ResourceKind::Entity),
            "link" => Ok(ResourceKind::Link),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// A single version row of an entity or link
#[derive(Debug, Clone)]
pub struct ResourceRow {
    pub id: String,
    pub kind: ResourceKind,
    pub type_id: String,
    /// Property bag as JSON text; parsed only at the API boundary
    pub properties: String,
    pub version: i64,
    pub previous_version_id: Option<String>,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub is_deleted: bool,
    pub is_latest: bool,
    pub acl_id: Option<i64>,
    /// Chain id of the source entity (links only)
    pub source_entity_id: Option<String>,
    /// Chain id of the target entity (links only)
    pub target_entity_id: Option<String>,
}

impl ResourceRow {
    /// Map a row produced by [`ResourceKind::select_columns`]
    pub fn from_row(kind: ResourceKind, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind,
            type_id: row.get(1)?,
            properties: row.get(2)?,
            version: row.get(3)?,
            previous_version_id: row.get(4)?,
            created_at: row.get(5)?,
            created_by: row.get(6)?,
            is_deleted: row.get::<_, i64>(7)? != 0,
            is_latest: row.get::<_, i64>(8)? != 0,
            acl_id: row.get(9)?,
            source_entity_id: row.get(10)?,
            target_entity_id: row.get(11)?,
        })
    }

    /// Insert this row into its backing table
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        match self.kind {
            ResourceKind::Entity => {
                conn.execute(
                    "INSERT INTO entities (id, type_id, properties, version, previous_version_id, \
                     created_at, created_by, is_deleted, is_latest, acl_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        &self.id,
                        &self.type_id,
                        &self.properties,
                        self.version,
                        &self.previous_version_id,
                        self.created_at,
                        &self.created_by,
                        self.is_deleted as i64,
                        self.is_latest as i64,
                        self.acl_id,
                    ],
                )?;
            }
            ResourceKind::Link => {
                conn.execute(
                    "INSERT INTO links (id, type_id, source_entity_id, target_entity_id, \
                     properties, version, previous_version_id, created_at, created_by, \
                     is_deleted, is_latest, acl_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        &self.id,
                        &self.type_id,
                        &self.source_entity_id,
                        &self.target_entity_id,
                        &self.properties,
                        self.version,
                        &self.previous_version_id,
                        self.created_at,
                        &self.created_by,
                        self.is_deleted as i64,
                        self.is_latest as i64,
                        self.acl_id,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Look up a row by its exact id
    pub fn find_by_id(
        conn: &Connection,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<ResourceRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            kind.select_columns(),
            kind.table()
        );
        let row = conn
            .query_row(&sql, [id], |row| ResourceRow::from_row(kind, row))
            .optional()?;
        Ok(row)
    }

    /// Parse the property bag
    pub fn properties_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.properties)?)
    }
}
