// src/chain.rs

//! Version chain traversal
//!
//! Every mutation of a resource inserts a new row with a fresh id, so a
//! logical resource is a chain of rows connected by previous_version_id.
//! Any row id of the chain is a valid handle; this module resolves such
//! handles to the latest row, a specific version, or the full chain.
//!
//! The recursive CTEs use UNION rather than UNION ALL so that a cycle
//! introduced by a buggy insert terminates instead of looping. Readers
//! tolerate transient writer races (zero or two rows flagged is_latest)
//! by preferring the maximum version.

use crate::db::models::{ResourceKind, ResourceRow};
use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// CTE that materializes every row id of the chain containing ?1
///
/// Phase one walks ancestors back to the chain root; phase two walks all
/// successors forward from the root, so forks created by concurrent
/// writers are all visible.
fn chain_cte(kind: ResourceKind) -> String {
    let table = kind.table();
    format!(
        "WITH RECURSIVE
         ancestors(id, previous_version_id) AS (
             SELECT id, previous_version_id FROM {table} WHERE id = ?1
             UNION
             SELECT r.id, r.previous_version_id FROM {table} r
             JOIN ancestors a ON r.id = a.previous_version_id
         ),
         chain(id) AS (
             SELECT id FROM ancestors WHERE previous_version_id IS NULL
             UNION
             SELECT r.id FROM {table} r JOIN chain c ON r.previous_version_id = c.id
         )"
    )
}

/// Resolve any row id of a chain to the chain's latest row
///
/// Fast path: the id itself is flagged latest. Slow path: collect the
/// whole chain and pick the latest-flagged row, breaking ties (or a
/// transient zero-latest state) by maximum version.
pub fn find_latest(
    conn: &Connection,
    kind: ResourceKind,
    id: &str,
) -> Result<Option<ResourceRow>> {
    let direct = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE id = ?1 AND is_latest = 1",
                kind.select_columns(),
                kind.table()
            ),
            [id],
            |row| ResourceRow::from_row(kind, row),
        )
        .optional()?;
    if direct.is_some() {
        return Ok(direct);
    }

    let sql = format!(
        "{cte}
         SELECT {cols} FROM {table}
         WHERE id IN (SELECT id FROM chain)
         ORDER BY is_latest DESC, version DESC
         LIMIT 1",
        cte = chain_cte(kind),
        cols = kind.select_columns(),
        table = kind.table(),
    );
    let row = conn
        .query_row(&sql, [id], |row| ResourceRow::from_row(kind, row))
        .optional()?;
    Ok(row)
}

/// Fetch version `n` of the chain containing `chain_id`
pub fn find_version(
    conn: &Connection,
    kind: ResourceKind,
    chain_id: &str,
    n: i64,
) -> Result<Option<ResourceRow>> {
    let sql = format!(
        "{cte}
         SELECT {cols} FROM {table}
         WHERE id IN (SELECT id FROM chain) AND version = ?2
         ORDER BY created_at DESC
         LIMIT 1",
        cte = chain_cte(kind),
        cols = kind.select_columns(),
        table = kind.table(),
    );
    let row = conn
        .query_row(&sql, params![chain_id, n], |row| {
            ResourceRow::from_row(kind, row)
        })
        .optional()?;
    Ok(row)
}

/// Fetch the full chain containing `chain_id`, ascending by version
pub fn list_chain(
    conn: &Connection,
    kind: ResourceKind,
    chain_id: &str,
) -> Result<Vec<ResourceRow>> {
    let sql = format!(
        "{cte}
         SELECT {cols} FROM {table}
         WHERE id IN (SELECT id FROM chain)
         ORDER BY version ASC, created_at ASC",
        cte = chain_cte(kind),
        cols = kind.select_columns(),
        table = kind.table(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([chain_id], |row| ResourceRow::from_row(kind, row))?;
    let mut chain = Vec::new();
    for row in rows {
        chain.push(row?);
    }
    Ok(chain)
}

/// Every row id of the chain containing `chain_id`
///
/// Graph traversal matches link endpoints against this set, because a
/// link may reference any historical row id of its endpoint chains.
pub fn chain_ids(conn: &Connection, kind: ResourceKind, chain_id: &str) -> Result<Vec<String>> {
    let sql = format!("{cte} SELECT id FROM chain", cte = chain_cte(kind));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([chain_id], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}
