// src/server/handlers/search.rs

//! Rich property-filter search
//!
//! POST /search accepts the full filter vocabulary: scalar filters,
//! creation-time ranges, rich `(path, op, value)` property filters, a
//! whitelisted sort column, and cursor pagination on the default order.

use super::open_db;
use crate::acl;
use crate::db::models::{Permission, ResourceKind};
use crate::error::{Error, Result};
use crate::query::{self, Cursor, ListFilter, PropertyFilter, SortSpec};
use crate::server::SharedState;
use crate::server::auth::{self, AuthUser};
use crate::server::response::{self, resource_view};
use axum::Json;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    /// "entity" (default) or "link"
    #[serde(default = "default_resource")]
    pub resource: String,
    pub type_id: Option<String>,
    pub created_by: Option<String>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub show_all_versions: bool,
    #[serde(default)]
    pub property_filters: Vec<PropertyFilter>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub sort_by: Option<String>,
    #[serde(default = "default_true")]
    pub sort_desc: bool,
}

fn default_resource() -> String {
    "entity".to_string()
}

fn default_true() -> bool {
    true
}

pub async fn search(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(body): Json<SearchBody>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let kind =
        ResourceKind::from_str(&body.resource).map_err(|e| Error::validation("resource", e))?;
    let filter = ListFilter {
        type_id: body.type_id,
        created_by: body.created_by,
        created_after: body.created_after,
        created_before: body.created_before,
        include_deleted: body.include_deleted,
        show_all_versions: body.show_all_versions,
        property_equals: Vec::new(),
        property_filters: body.property_filters,
    };

    let sort = body
        .sort_by
        .as_deref()
        .map(|column| SortSpec::new(column, body.sort_desc))
        .transpose()?;
    let cursor = body.cursor.as_deref().and_then(Cursor::decode);
    let limit = body.limit.unwrap_or(query::DEFAULT_LIMIT);

    let acl_filter =
        acl::build_acl_filter(&conn, &actor, Permission::Read, guard.config.acl_filter_cutoff)?;
    guard.metrics.record_acl_shape(acl_filter.is_post_query());

    let page = query::list_resources(
        &conn,
        kind,
        &filter,
        &acl_filter,
        limit,
        cursor.as_ref(),
        sort.as_ref(),
    )?;

    let views: Vec<Value> = page.items.iter().map(resource_view).collect();
    Ok(response::page(views, page.next_cursor, page.has_more))
}
