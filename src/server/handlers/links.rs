// src/server/handlers/links.rs

//! Link endpoints
//!
//! Same versioned surface as entities minus the traversal routes. Link
//! creation validates that both endpoint chains resolve; source and
//! target are immutable afterwards.

use super::resources::{
    CreateResourceBody, PutAclBody, UpdateResourceBody, create_impl, delete_impl, history_impl,
    list_impl, put_acl_impl, read_acl_impl, read_impl, restore_impl, update_impl, version_impl,
    versions_impl,
};
use crate::db::models::ResourceKind;
use crate::error::Result;
use crate::server::SharedState;
use crate::server::auth::AuthUser;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use std::collections::HashMap;

const KIND: ResourceKind = ResourceKind::Link;

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
