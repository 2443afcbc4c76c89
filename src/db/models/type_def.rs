// src/db/models/type_def.rs

//! Type registry model
//!
//! Types name entity and link kinds and optionally carry a JSON Schema
//! for their property bags. Types are immutable once created; evolution
//! is by creating a new type.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Whether a type describes entities or links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Entity,
    Link,
}

impl TypeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Entity => "entity",
            TypeCategory::Link => "link",
        }
    }
}

impl FromStr for TypeCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "entity" => Ok(TypeCategory::Entity),
            "link" => Ok(TypeCategory::Link),
            _ => Err(format!("Invalid type category: {}", s)),
        }
    }
}

/// A registered entity or link type
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: String,
    pub name: String,
    pub category: TypeCategory,
    pub description: Option<String>,
    /// JSON Schema document as text; None means properties are unvalidated
    pub json_schema: Option<String>,
    pub created_at: i64,
    pub created_by: Option<String>,
}

impl TypeDef {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let category: String = row.get(2)?;
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            category: TypeCategory::from_str(&category).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?,
            description: row.get(3)?,
            json_schema: row.get(4)?,
            created_at: row.get(5)?,
            created_by: row.get(6)?,
        })
    }

    const COLUMNS: &'static str =
        "id, name, category, description, json_schema, created_at, created_by";

    /// Insert this type into the database
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO types (id, name, category, description, json_schema, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.id,
                &self.name,
                self.category.as_str(),
                &self.description,
                &self.json_schema,
                self.created_at,
                &self.created_by,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<TypeDef>> {
        let sql = format!("SELECT {} FROM types WHERE id = ?1", Self::COLUMNS);
        let row = conn.query_row(&sql, [id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<TypeDef>> {
        let sql = format!("SELECT {} FROM types WHERE name = ?1", Self::COLUMNS);
        let row = conn.query_row(&sql, [name], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<TypeDef>> {
        let sql = format!("SELECT {} FROM types ORDER BY name", Self::COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::from_row)?;
        let mut types = Vec::new();
        for row in rows {
            types.push(row?);
        }
        Ok(types)
    }
}
