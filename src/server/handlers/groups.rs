// src/server/handlers/groups.rs

//! Group administration endpoints
//!
//! Membership edges keep the DAG acyclic (rejected with a conflict when
//! a cycle would form) and every membership change drops all memoized
//! principal closures.

use super::{now, open_db};
use crate::acl::groups as group_store;
use crate::cache::PRINCIPALS_PREFIX;
use crate::db::models::{Group, GroupMember, PrincipalType};
use crate::error::{Error, Result};
use crate::server::SharedState;
use crate::server::auth::AuthUser;
use crate::server::response;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;

fn group_view(group: &Group) -> Value {
    json!({
        "id": group.id,
        "name": group.name,
        "description": group.description,
        "created_at": group.created_at,
    })
}

fn member_view(member: &GroupMember) -> Value {
    json!({
        "group_id": member.group_id,
        "member_type": member.member_type.as_str(),
        "member_id": member.member_id,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub name: String,
    pub description: Option<String>,
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(body): Json<CreateGroupBody>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    auth.0.as_deref().ok_or(Error::Unauthenticated)?;
    let conn = open_db(&guard.config)?;

    let group = group_store::create_group(&conn, &body.name, body.description.as_deref(), now())?;
    Ok(response::created(group_view(&group)))
}

pub async fn list(State(state): State<SharedState>) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let conn = open_db(&guard.config)?;

    let groups = group_store::list_groups(&conn)?;
    let views: Vec<Value> = groups.iter().map(group_view).collect();
    Ok(response::ok(views))
}

pub async fn members(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let conn = open_db(&guard.config)?;

    let members = group_store::list_members(&conn, &id)?;
    let views: Vec<Value> = members.iter().map(member_view).collect();
    Ok(response::ok(views))
}

#[derive(Debug, Deserialize)]
pub struct MemberBody {
    pub member_type: String,
    pub member_id: String,
}

pub async fn add_member(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<MemberBody>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    auth.0.as_deref().ok_or(Error::Unauthenticated)?;
    let conn = open_db(&guard.config)?;

    let member_type = PrincipalType::from_str(&body.member_type)
        .map_err(|e| Error::validation("member_type", e))?;
    group_store::add_member(&conn, &id, member_type, &body.member_id)?;

    // closures memoized before this edge existed are stale now
    guard.cache.invalidate_prefix(PRINCIPALS_PREFIX).await;
    Ok(response::created(json!({
        "group_id": id,
        "member_type": member_type.as_str(),
        "member_id": body.member_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MemberParams {
    pub member_type: String,
    pub member_id: String,
}

pub async fn remove_member(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<MemberParams>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    auth.0.as_deref().ok_or(Error::Unauthenticated)?;
    let conn = open_db(&guard.config)?;

    let member_type = PrincipalType::from_str(&params.member_type)
        .map_err(|e| Error::validation("member_type", e))?;
    let removed = group_store::remove_member(&conn, &id, member_type, &params.member_id)?;
    if !removed {
        return Err(Error::NotFound(format!(
            "member {}:{} in group {}",
            member_type.as_str(),
            params.member_id,
            id
        )));
    }

    guard.cache.invalidate_prefix(PRINCIPALS_PREFIX).await;
    Ok(response::no_content())
}
