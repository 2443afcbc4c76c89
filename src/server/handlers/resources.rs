// src/server/handlers/resources.rs

//! Shared handler logic for entities and links
//!
//! Every endpoint in the pair of resource surfaces funnels through the
//! functions here with a [`ResourceKind`] selector. Entity reads flow
//! through the TTL cache; every mutation invalidates the handle the
//! caller used, the demoted row id, and the freshly inserted row id.

use super::{now, open_db};
use crate::acl;
use crate::cache;
use crate::db::models::{Acl, AclEntry, ResourceKind, ResourceRow};
use crate::diff;
use crate::error::{Error, Result};
use crate::query::{self, Cursor, ListFilter};
use crate::server::auth::{self, AuthUser};
use crate::server::response::{self, apply_fields, resource_view};
use crate::server::{ServerState, SharedState};
use axum::response::Response;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::warn;

/// POST /entities and /links body
#[derive(Debug, Deserialize)]
pub(crate) struct CreateResourceBody {
    pub type_id: String,
    #[serde(default = "empty_object")]
    pub properties: Value,
    #[serde(default)]
    pub acl_entries: Vec<AclEntry>,
    pub source_entity_id: Option<String>,
    pub target_entity_id: Option<String>,
}

fn empty_object() -> Value {
    json!({})
}

/// PUT /entities/:id and /links/:id body
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateResourceBody {
    pub properties: Value,
}

/// PUT /entities/:id/acl and /links/:id/acl body
#[derive(Debug, Deserialize)]
pub(crate) struct PutAclBody {
    #[serde(default)]
    pub entries: Vec<AclEntry>,
}

fn require_object(properties: &Value) -> Result<()> {
    if properties.is_object() {
        Ok(())
    } else {
        Err(Error::validation("properties", "properties must be a JSON object"))
    }
}

/// Query parameters of the listing endpoints, parsed from the raw map so
/// `property_<key>` filters can be dynamic
pub(crate) struct ListParams {
    pub filter: ListFilter,
    pub limit: usize,
    pub cursor: Option<Cursor>,
    pub fields: Option<Vec<String>>,
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "true" | "1")
}

pub(crate) fn parse_list_params(params: &HashMap<String, String>) -> Result<ListParams> {
    let mut filter = ListFilter::default();
    let mut limit = query::DEFAULT_LIMIT;
    let mut cursor = None;
    let mut fields = None;

    for (key, value) in params {
        match key.as_str() {
            "limit" => {
                limit = value
                    .parse::<usize>()
                    .map_err(|_| Error::validation("limit", format!("invalid limit: {}", value)))?;
            }
            "cursor" => cursor = Cursor::decode(value),
            "type_id" => filter.type_id = Some(value.clone()),
            "created_by" => filter.created_by = Some(value.clone()),
            "created_after" => {
                filter.created_after = Some(value.parse::<i64>().map_err(|_| {
                    Error::validation("created_after", format!("invalid created_after: {}", value))
                })?);
            }
            "created_before" => {
                filter.created_before = Some(value.parse::<i64>().map_err(|_| {
                    Error::validation("created_before", format!("invalid created_before: {}", value))
                })?);
            }
            "include_deleted" => filter.include_deleted = parse_bool(value),
            "show_all_versions" => filter.show_all_versions = parse_bool(value),
            "fields" => {
                fields = Some(
                    value
                        .split(',')
                        .map(|f| f.trim().to_string())
                        .filter(|f| !f.is_empty())
                        .collect(),
                );
            }
            _ => {
                if let Some(prop_key) = key.strip_prefix("property_") {
                    filter
                        .property_equals
                        .push((prop_key.to_string(), query::coerce_scalar(value)));
                } else {
                    warn!(param = key.as_str(), "ignoring unknown query parameter");
                }
            }
        }
    }

    Ok(ListParams {
        filter,
        limit: limit.clamp(1, query::MAX_LIMIT),
        cursor,
        fields,
    })
}

fn project(row: &ResourceRow, fields: Option<&Vec<String>>) -> Result<Value> {
    let view = resource_view(row);
    match fields {
        Some(fields) => apply_fields(view, fields),
        None => Ok(view),
    }
}

pub(crate) async fn create_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    body: CreateResourceBody,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let mut conn = open_db(&guard.config)?;

    require_object(&body.properties)?;
    let req = crate::store::NewResource {
        type_id: body.type_id,
        properties: body.properties,
        acl_entries: body.acl_entries,
        source_entity_id: body.source_entity_id,
        target_entity_id: body.target_entity_id,
    };
    let row = crate::store::create(&mut conn, kind, &req, &actor, now())?;
    Ok(response::created(resource_view(&row)))
}

pub(crate) async fn list_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    params: HashMap<String, String>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let list = parse_list_params(&params)?;
    let acl_filter = acl::build_acl_filter(
        &conn,
        &actor,
        crate::db::models::Permission::Read,
        guard.config.acl_filter_cutoff,
    )?;
    guard.metrics.record_acl_shape(acl_filter.is_post_query());

    let page = query::list_resources(
        &conn,
        kind,
        &list.filter,
        &acl_filter,
        list.limit,
        list.cursor.as_ref(),
        None,
    )?;

    let mut views = Vec::with_capacity(page.items.len());
    for row in &page.items {
        views.push(project(row, list.fields.as_ref())?);
    }
    Ok(response::page(views, page.next_cursor, page.has_more))
}

/// Cached shape of an entity read: the acl gate plus the rendered view
fn cache_envelope(row: &ResourceRow) -> Value {
    json!({"acl_id": row.acl_id, "view": resource_view(row)})
}

pub(crate) async fn read_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
    params: HashMap<String, String>,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let include_deleted = params
        .get("include_deleted")
        .is_some_and(|v| parse_bool(v));
    let fields: Option<Vec<String>> = params.get("fields").map(|value| {
        value
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    });

    // only plain entity reads flow through the cache
    let cacheable = kind == ResourceKind::Entity && !include_deleted && fields.is_none();
    if cacheable {
        if let Some(cached) = guard.cache.get(&cache::entity_key(&id)).await {
            guard.metrics.record_cache_hit();
            let acl_id = cached.get("acl_id").and_then(Value::as_i64);
            if !acl::has_permission(&conn, &actor, acl_id, crate::db::models::Permission::Read)? {
                return Err(Error::Forbidden(format!("read denied on {}", id)));
            }
            let view = cached.get("view").cloned().unwrap_or(Value::Null);
            return Ok(response::ok(view));
        }
        guard.metrics.record_cache_miss();
    }

    let row = crate::store::get_latest(&conn, kind, &id, &actor, include_deleted)?;
    if cacheable && !row.is_deleted {
        guard
            .cache
            .put(
                &cache::entity_key(&id),
                cache_envelope(&row),
                guard.config.entity_cache_ttl,
            )
            .await;
    }
    Ok(response::ok(project(&row, fields.as_ref())?))
}

/// Drop the cache keys a mutation can have made stale
///
/// The chain is addressable by the handle the caller used, by the
/// demoted row id, and by the fresh row id; invalidation failure is
/// logged, never fatal.
async fn invalidate_entity_cache(state: &ServerState, kind: ResourceKind, handle: &str, row: &ResourceRow) {
    if kind != ResourceKind::Entity {
        return;
    }
    state.cache.invalidate(&cache::entity_key(handle)).await;
    if let Some(previous) = &row.previous_version_id {
        state.cache.invalidate(&cache::entity_key(previous)).await;
    }
    state.cache.invalidate(&cache::entity_key(&row.id)).await;
}

fn note_conflict<T>(state: &ServerState, result: &Result<T>) {
    if let Err(Error::WriteConflict(_)) = result {
        state.metrics.record_write_conflict();
    }
}

pub(crate) async fn update_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
    body: UpdateResourceBody,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let mut conn = open_db(&guard.config)?;

    require_object(&body.properties)?;
    let result = crate::store::update(&mut conn, kind, &id, &body.properties, &actor, now());
    note_conflict(&guard, &result);
    let row = result?;

    invalidate_entity_cache(&guard, kind, &id, &row).await;
    Ok(response::ok(resource_view(&row)))
}

pub(crate) async fn delete_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let mut conn = open_db(&guard.config)?;

    let result = crate::store::soft_delete(&mut conn, kind, &id, &actor, now());
    note_conflict(&guard, &result);
    let row = result?;

    invalidate_entity_cache(&guard, kind, &id, &row).await;
    Ok(response::no_content())
}

pub(crate) async fn restore_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let mut conn = open_db(&guard.config)?;

    let result = crate::store::restore(&mut conn, kind, &id, &actor, now());
    note_conflict(&guard, &result);
    let row = result?;

    invalidate_entity_cache(&guard, kind, &id, &row).await;
    Ok(response::ok(resource_view(&row)))
}

pub(crate) async fn versions_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let rows = crate::store::list_versions(&conn, kind, &id, &actor)?;
    let views: Vec<Value> = rows.iter().map(resource_view).collect();
    Ok(response::ok(views))
}

pub(crate) async fn version_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
    n: i64,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let row = crate::store::get_version(&conn, kind, &id, n, &actor)?;
    Ok(response::ok(resource_view(&row)))
}

pub(crate) async fn history_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let rows = crate::store::list_versions(&conn, kind, &id, &actor)?;
    let mut entries = Vec::with_capacity(rows.len());
    let mut previous: Option<Value> = None;
    for row in &rows {
        let properties = row.properties_value()?;
        let (summary, delta) = match &previous {
            None => ("Initial version".to_string(), diff::initial_diff(&properties)),
            Some(prev) => (
                format!("Version {}", row.version),
                diff::diff_properties(prev, &properties),
            ),
        };
        entries.push(json!({
            "id": row.id,
            "version": row.version,
            "created_at": row.created_at,
            "created_by": row.created_by,
            "is_deleted": row.is_deleted,
            "summary": summary,
            "diff": delta,
        }));
        previous = Some(properties);
    }
    Ok(response::ok(entries))
}

fn acl_view(conn: &Connection, row: &ResourceRow) -> Result<Value> {
    let entries = match row.acl_id {
        None => Vec::new(),
        Some(acl_id) => Acl::entries(conn, acl_id)?,
    };
    Ok(json!({"acl_id": row.acl_id, "entries": entries}))
}

pub(crate) async fn read_acl_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let conn = open_db(&guard.config)?;

    let row = crate::store::get_latest(&conn, kind, &id, &actor, true)?;
    Ok(response::ok(acl_view(&conn, &row)?))
}

pub(crate) async fn put_acl_impl(
    state: SharedState,
    kind: ResourceKind,
    auth: AuthUser,
    id: String,
    body: PutAclBody,
) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();
    let actor = auth::resolve_actor(&guard, &auth).await?;
    let mut conn = open_db(&guard.config)?;

    let result = crate::store::set_acl(&mut conn, kind, &id, &body.entries, &actor, now());
    note_conflict(&guard, &result);
    let row = result?;

    invalidate_entity_cache(&guard, kind, &id, &row).await;
    Ok(response::ok(acl_view(&conn, &row)?))
}
