// src/graph.rs

//! Graph traversal over latest link rows
//!
//! Link endpoints store chain ids, which may be any historical row id of
//! the endpoint's chain. Edge matching therefore collects the queried
//! resource's full chain-id set and resolves every far side through the
//! version chain engine. ACL filtering applies to the link's acl_id and
//! the far-side entity's acl_id independently.

use crate::acl::{self, AclFilter, PrincipalSet};
use crate::chain;
use crate::db::models::{Permission, ResourceKind, ResourceRow};
use crate::error::{Error, Result};
use crate::validate::validate_resource_id;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

/// Traversal direction relative to the queried resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    /// Link column matched against the queried chain's id set
    fn near_column(&self) -> &'static str {
        match self {
            Direction::Outbound => "source_entity_id",
            Direction::Inbound => "target_entity_id",
        }
    }

    /// Chain id of the far side of a matching link
    fn far_id<'a>(&self, link: &'a ResourceRow) -> Option<&'a str> {
        match self {
            Direction::Outbound => link.target_entity_id.as_deref(),
            Direction::Inbound => link.source_entity_id.as_deref(),
        }
    }
}

/// Optional traversal restrictions
#[derive(Debug, Clone, Default)]
pub struct TraversalFilter {
    pub link_type_id: Option<String>,
    pub entity_type_id: Option<String>,
    pub include_deleted: bool,
}

/// One traversal hit: a link and the resolved far-side entity
#[derive(Debug, Clone)]
pub struct Edge {
    pub link: ResourceRow,
    pub neighbor: ResourceRow,
    pub direction: Direction,
}

/// A deduplicated neighbor with every link connecting it
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub entity: ResourceRow,
    pub connections: Vec<(ResourceRow, Direction)>,
}

fn edges_one_direction(
    conn: &Connection,
    chain_id_set: &[String],
    direction: Direction,
    filter: &TraversalFilter,
    link_acl: &AclFilter,
    entity_acl: &AclFilter,
) -> Result<Vec<Edge>> {
    if chain_id_set.is_empty() {
        return Ok(Vec::new());
    }

    let mut clauses = vec!["is_latest = 1".to_string()];
    let mut params: Vec<rusqlite::types::Value> = Vec::new();

    let placeholders: Vec<&str> = chain_id_set.iter().map(|_| "?").collect();
    clauses.push(format!(
        "{} IN ({})",
        direction.near_column(),
        placeholders.join(", ")
    ));
    for id in chain_id_set {
        params.push(id.clone().into());
    }

    if !filter.include_deleted {
        clauses.push("is_deleted = 0".to_string());
    }
    if let Some(link_type) = &filter.link_type_id {
        clauses.push("type_id = ?".to_string());
        params.push(link_type.clone().into());
    }
    if let Some((clause, acl_params)) = link_acl.where_clause("acl_id") {
        clauses.push(clause);
        for id in acl_params {
            params.push(id.into());
        }
    }

    let sql = format!(
        "SELECT {cols} FROM links WHERE {where_sql} ORDER BY created_at DESC, id DESC",
        cols = ResourceKind::Link.select_columns(),
        where_sql = clauses.join(" AND "),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
        ResourceRow::from_row(ResourceKind::Link, row)
    })?;

    let mut edges = Vec::new();
    for row in rows {
        let link = row?;
        if link_acl.is_post_query() && !link_acl.allows_row(link.acl_id) {
            continue;
        }
        let Some(far_id) = direction.far_id(&link) else {
            continue;
        };
        let Some(neighbor) = chain::find_latest(conn, ResourceKind::Entity, far_id)? else {
            continue;
        };
        if neighbor.is_deleted && !filter.include_deleted {
            continue;
        }
        if let Some(entity_type) = &filter.entity_type_id {
            if &neighbor.type_id != entity_type {
                continue;
            }
        }
        if !entity_acl.allows_row(neighbor.acl_id) {
            continue;
        }
        edges.push(Edge {
            link,
            neighbor,
            direction,
        });
    }
    Ok(edges)
}

fn resolve_and_check(
    conn: &Connection,
    chain_id: &str,
    actor: &PrincipalSet,
) -> Result<(ResourceRow, Vec<String>)> {
    validate_resource_id("id", chain_id)?;
    let latest = chain::find_latest(conn, ResourceKind::Entity, chain_id)?
        .ok_or_else(|| Error::NotFound(chain_id.to_string()))?;
    if !acl::has_permission(conn, actor, latest.acl_id, Permission::Read)? {
        return Err(Error::Forbidden(format!("read denied on {}", chain_id)));
    }
    let ids = chain::chain_ids(conn, ResourceKind::Entity, &latest.id)?;
    Ok((latest, ids))
}

/// Links in one direction from the resource, with resolved far sides
pub fn edges(
    conn: &Connection,
    chain_id: &str,
    direction: Direction,
    filter: &TraversalFilter,
    actor: &PrincipalSet,
    acl_cutoff: usize,
) -> Result<Vec<Edge>> {
    let (_, chain_id_set) = resolve_and_check(conn, chain_id, actor)?;
    let acl_filter = acl::build_acl_filter(conn, actor, Permission::Read, acl_cutoff)?;
    edges_one_direction(conn, &chain_id_set, direction, filter, &acl_filter, &acl_filter)
}

/// Both directions, deduplicated by neighbor while accumulating every
/// connecting link with its direction
pub fn neighbors(
    conn: &Connection,
    chain_id: &str,
    filter: &TraversalFilter,
    actor: &PrincipalSet,
    acl_cutoff: usize,
) -> Result<Vec<Neighbor>> {
    let (_, chain_id_set) = resolve_and_check(conn, chain_id, actor)?;
    let acl_filter = acl::build_acl_filter(conn, actor, Permission::Read, acl_cutoff)?;

    let mut combined = edges_one_direction(
        conn,
        &chain_id_set,
        Direction::Outbound,
        filter,
        &acl_filter,
        &acl_filter,
    )?;
    combined.extend(edges_one_direction(
        conn,
        &chain_id_set,
        Direction::Inbound,
        filter,
        &acl_filter,
        &acl_filter,
    )?);

    let mut order: Vec<String> = Vec::new();
    let mut by_neighbor: HashMap<String, Neighbor> = HashMap::new();
    for edge in combined {
        let key = edge.neighbor.id.clone();
        match by_neighbor.get_mut(&key) {
            Some(existing) => existing.connections.push((edge.link, edge.direction)),
            None => {
                order.push(key.clone());
                by_neighbor.insert(
                    key,
                    Neighbor {
                        entity: edge.neighbor,
                        connections: vec![(edge.link, edge.direction)],
                    },
                );
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| by_neighbor.remove(&key))
        .collect())
}
