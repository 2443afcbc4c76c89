// src/server/response.rs

//! Response envelope and error mapping
//!
//! Success bodies are `{data, message?}` (cursor pages add next_cursor
//! and has_more); failures are `{error, code, details?}`. Internal
//! errors log full details under a correlation id and echo only the id.

use crate::db::models::ResourceRow;
use crate::error::Error;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;
use uuid::Uuid;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiData<T: Serialize> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cursor-page envelope
#[derive(Debug, Serialize)]
pub struct ApiPage<T: Serialize> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Error envelope
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiData {
        data,
        message: None,
    })
    .into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(ApiData {
            data,
            message: None,
        }),
    )
        .into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn page<T: Serialize>(data: Vec<T>, next_cursor: Option<String>, has_more: bool) -> Response {
    Json(ApiPage {
        data,
        next_cursor,
        has_more,
    })
    .into_response()
}

/// JSON view of a resource row with the property bag parsed
pub fn resource_view(row: &ResourceRow) -> Value {
    let properties: Value = serde_json::from_str(&row.properties).unwrap_or(Value::Null);
    let mut view = json!({
        "id": row.id,
        "type_id": row.type_id,
        "properties": properties,
        "version": row.version,
        "previous_version_id": row.previous_version_id,
        "created_at": row.created_at,
        "created_by": row.created_by,
        "is_deleted": row.is_deleted,
        "is_latest": row.is_latest,
        "acl_id": row.acl_id,
    });
    if let (Some(source), Some(target)) = (&row.source_entity_id, &row.target_entity_id) {
        view["source_entity_id"] = json!(source);
        view["target_entity_id"] = json!(target);
    }
    view
}

/// Allowed `fields` projection keys
pub const PROJECTION_FIELDS: &[&str] = &[
    "id",
    "type_id",
    "properties",
    "version",
    "previous_version_id",
    "created_at",
    "created_by",
    "is_deleted",
    "is_latest",
    "acl_id",
    "source_entity_id",
    "target_entity_id",
];

/// Project a view down to the requested field list
///
/// Unknown fields are rejected so the allow-list stays authoritative.
pub fn apply_fields(view: Value, fields: &[String]) -> Result<Value, Error> {
    for field in fields {
        if !PROJECTION_FIELDS.contains(&field.as_str()) {
            return Err(Error::validation(
                "fields",
                format!("unknown field: {}", field),
            ));
        }
    }
    let Value::Object(map) = view else {
        return Ok(view);
    };
    let projected: serde_json::Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| fields.iter().any(|f| f == key))
        .collect();
    Ok(Value::Object(projected))
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. }
            | Error::Json(_)
            | Error::SchemaValidationFailed(_)
            | Error::InvalidAcl(_)
            | Error::InvalidPrincipals(_)
            | Error::InvalidVersion { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) | Error::TypeNotFound(_) | Error::GroupNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::AlreadyDeleted(_)
            | Error::NotDeleted(_)
            | Error::ResourceDeleted(_)
            | Error::TypeExists(_)
            | Error::GroupCycle { .. } => StatusCode::CONFLICT,
            Error::WriteConflict(_) => StatusCode::PRECONDITION_FAILED,
            Error::Database(_)
            | Error::Io(_)
            | Error::InitError(_)
            | Error::DatabaseNotFound(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Error::SchemaValidationFailed(issues) => Some(json!(issues)),
            Error::Validation { field, message } => {
                Some(json!({"field": field, "message": message}))
            }
            Error::InvalidVersion {
                chain_id,
                requested,
            } => Some(json!({"chain_id": chain_id, "requested": requested})),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // full details go to the log, only the correlation id leaves
            let correlation_id = Uuid::new_v4().to_string();
            error!(correlation_id = %correlation_id, error = %self, "internal error");
            ApiError {
                error: "Internal server error".to_string(),
                code: "internal".to_string(),
                details: Some(json!({"correlation_id": correlation_id})),
            }
        } else {
            ApiError {
                error: self.to_string(),
                code: self.code().to_string(),
                details: self.details(),
            }
        };
        (status, Json(body)).into_response()
    }
}
