// src/store/types.rs

//! Type registry operations
//!
//! Types are immutable once created. A submitted JSON Schema is compiled
//! up front so malformed schemas are rejected at registration, not at
//! first use.

use crate::db::models::{TypeCategory, TypeDef};
use crate::error::{Error, Result};
use crate::validate;
use rusqlite::Connection;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Register a new type
pub fn create_type(
    conn: &Connection,
    name: &str,
    category: TypeCategory,
    description: Option<&str>,
    json_schema: Option<&Value>,
    created_by: Option<&str>,
    now: i64,
) -> Result<TypeDef> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "type name must not be empty"));
    }
    if TypeDef::find_by_name(conn, name)?.is_some() {
        return Err(Error::TypeExists(name.to_string()));
    }
    if let Some(schema) = json_schema {
        validate::compile_schema(schema)?;
    }

    let type_def = TypeDef {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        category,
        description: description.map(|s| s.to_string()),
        json_schema: json_schema.map(|s| s.to_string()),
        created_at: now,
        created_by: created_by.map(|s| s.to_string()),
    };
    type_def.insert(conn)?;

    info!(target: "audit", op = "create_type", id = %type_def.id, name = %type_def.name);
    Ok(type_def)
}

pub fn get_type(conn: &Connection, id: &str) -> Result<TypeDef> {
    TypeDef::find_by_id(conn, id)?.ok_or_else(|| Error::TypeNotFound(id.to_string()))
}

pub fn list_types(conn: &Connection) -> Result<Vec<TypeDef>> {
    TypeDef::list_all(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_and_fetch_type() {
        let conn = test_conn();
        let created = create_type(
            &conn,
            "document",
            TypeCategory::Entity,
            Some("A document node"),
            Some(&json!({"type": "object"})),
            Some("alice"),
            100,
        )
        .unwrap();

        let fetched = get_type(&conn, &created.id).unwrap();
        assert_eq!(fetched.name, "document");
        assert_eq!(fetched.category, TypeCategory::Entity);
        assert!(fetched.json_schema.is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let conn = test_conn();
        create_type(&conn, "doc", TypeCategory::Entity, None, None, None, 0).unwrap();
        let err = create_type(&conn, "doc", TypeCategory::Link, None, None, None, 0).unwrap_err();
        assert!(matches!(err, Error::TypeExists(_)));
    }

    #[test]
    fn test_malformed_schema_rejected() {
        let conn = test_conn();
        let err = create_type(
            &conn,
            "broken",
            TypeCategory::Entity,
            None,
            Some(&json!({"type": 42})),
            None,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
