// src/server/handlers/entities.rs

//! Entity endpoints, including graph traversal
//!
//! Versioned CRUD is shared with links (see `resources`); the traversal
//! endpoints resolve neighbors through the version chain engine and
//! filter on both the link ACL and the far-side entity ACL.

use super::open_db;
use super::resources::{
    CreateResourceBody, PutAclBody, UpdateResourceBody, create_impl, delete_impl, history_impl,
    list_impl, put_acl_impl, read_acl_impl, read_impl, restore_impl, update_impl, version_impl,
    versions_impl,
};
use crate::db::models::ResourceKind;
use crate::error::Result;
use crate::graph::{self, Direction, TraversalFilter};
use crate::server::SharedState;
use crate::server::auth::{self, AuthUser};
use crate::server::response::{self, resource_view};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde_json::{Value, json};
use std::collections::HashMap;

const KIND: ResourceKind = ResourceKind::Entity;

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(body): Json<CreateResourceBody>,
) -> Result<Response> {
    create_impl(state, KIND, auth, body).await
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    list_impl(state, KIND, auth, params).await
}

pub async fn read(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    read_impl(state, KIND, auth, id, params).await
}

pub async fn update(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateResourceBody>,
) -> Result<Response> {
    update_impl(state, KIND, auth, id, body).await
}

pub async fn remove(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    delete_impl(state, KIND, auth, id).await
}

pub async fn restore(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    restore_impl(state, KIND, auth, id).await
}

pub async fn versions(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    versions_impl(state, KIND, auth, id).await
}

pub async fn version(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path((id, n)): Path<(String, i64)>,
) -> Result<Response> {
    version_impl(state, KIND, auth, id, n).await
}

pub async fn history(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    history_impl(state, KIND, auth, id).await
}

pub async fn read_acl(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    read_acl_impl(state, KIND, auth, id).await
}

pub async fn put_acl(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<PutAclBody>,
) -> Result<Response> {
    put_acl_impl(state, KIND, auth, id, body).await
}

fn parse_traversal_filter(params: &HashMap<String, String>) -> TraversalFilter {
    TraversalFilter {
        link_type_id: params.get("link_type_id").cloned(),
        entity_type_id: params.get("entity_type_id").cloned(),
        include_deleted: params
            .get("include_deleted")
            .is_some_and(|v| matches!(v.as_str(), "true" | "1")),
    }
}

fn edge_view(edge: &graph::Edge) -> Value {
    json!({
        "link": resource_view(&edge.link),
        "entity": resource_view(&edge.neighbor),
        "direction": edge.direction,
    })
}

async fn traverse(
    state: SharedState,
    auth: AuthUser,
    id: String,
    params: HashMap<String, String>,
    direction: Direction,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let filter = parse_traversal_filter(&params);
    let edges = graph::edges(
        &conn,
        &id,
        direction,
        &filter,
        &actor,
        guard.config.acl_filter_cutoff,
    )?;
    let views: Vec<Value> = edges.iter().map(edge_view).collect();
    Ok(response::ok(views))
}

pub async fn outbound(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    traverse(state, auth, id, params, Direction::Outbound).await
}

pub async fn inbound(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    traverse(state, auth, id, params, Direction::Inbound).await
}

pub async fn neighbors(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let filter = parse_traversal_filter(&params);
    let neighbors = graph::neighbors(
        &conn,
        &id,
        &filter,
        &actor,
        guard.config.acl_filter_cutoff,
    )?;

    let views: Vec<Value> = neighbors
        .iter()
        .map(|neighbor| {
            let connections: Vec<Value> = neighbor
                .connections
                .iter()
                .map(|(link, direction)| {
                    json!({"link": resource_view(link), "direction": direction})
                })
                .collect();
            json!({
                "entity": resource_view(&neighbor.entity),
                "connections": connections,
            })
        })
        .collect();
    Ok(response::ok(views))
}
