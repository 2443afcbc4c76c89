// src/server/handlers/types.rs

//! Type registry endpoints
//!
//! Types are immutable once created, so the surface is list/create/read.
//! Creation requires an authenticated caller and compiles any submitted
//! JSON Schema before the row is written.

use super::{now, open_db};
use crate::db::models::TypeCategory;
use crate::error::{Error, Result};
use crate::server::SharedState;
use crate::server::auth::AuthUser;
use crate::server::response;
use crate::store;
use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;

fn type_view(type_def: &crate::db::models::TypeDef) -> Value {
    let schema: Option<Value> = type_def
        .json_schema
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());
    json!({
        "id": type_def.id,
        "name": type_def.name,
        "category": type_def.category.as_str(),
        "description": type_def.description,
        "json_schema": schema,
        "created_at": type_def.created_at,
        "created_by": type_def.created_by,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateTypeBody {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub json_schema: Option<Value>,
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(body): Json<CreateTypeBody>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let user = auth.0.as_deref().ok_or(Error::Unauthenticated)?;
    let conn = open_db(&guard.config)?;

    let category =
        TypeCategory::from_str(&body.category).map_err(|e| Error::validation("category", e))?;
    let type_def = store::create_type(
        &conn,
        &body.name,
        category,
        body.description.as_deref(),
        body.json_schema.as_ref(),
        Some(user),
        now(),
    )?;
    Ok(response::created(type_view(&type_def)))
}

pub async fn list(State(state): State<SharedState>) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let conn = open_db(&guard.config)?;

    let types = store::list_types(&conn)?;
    let views: Vec<Value> = types.iter().map(type_view).collect();
    Ok(response::ok(views))
}

pub async fn read(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let conn = open_db(&guard.config)?;

    let type_def = store::get_type(&conn, &id)?;
    Ok(response::ok(type_view(&type_def)))
}
