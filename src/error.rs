// src/error.rs

use crate::validate::ValidationIssue;
use thiserror::Error;

/// Core error types for Trellis
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Request-level validation failure (bad UUID, bad property path, bad body)
    ///
    /// Carries the offending field so the error envelope can surface
    /// per-field details, same as schema failures.
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// Referenced type does not exist
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// Type name already registered (types are immutable; evolve by new type)
    #[error("Type already exists: {0}")]
    TypeExists(String),

    /// Property bag rejected by the type's JSON Schema
    #[error("Schema validation failed: {} issue(s)", .0.len())]
    SchemaValidationFailed(Vec<ValidationIssue>),

    /// Malformed ACL entry list
    #[error("Invalid ACL: {0}")]
    InvalidAcl(String),

    /// ACL entry names a principal that cannot be resolved
    #[error("Invalid principals: {0}")]
    InvalidPrincipals(String),

    /// No chain contains the requested id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested version number is outside the chain
    #[error("Invalid version {requested} for chain {chain_id}")]
    InvalidVersion { chain_id: String, requested: i64 },

    /// Caller lacks the required permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Caller is not authenticated and the operation requires it
    #[error("Authentication required")]
    Unauthenticated,

    /// Soft-delete requested on an already-deleted chain
    #[error("Resource already deleted: {0}")]
    AlreadyDeleted(String),

    /// Restore requested on a chain that is not deleted
    #[error("Resource is not deleted: {0}")]
    NotDeleted(String),

    /// Update or ACL change requested on a soft-deleted chain
    #[error("Resource is deleted: {0}")]
    ResourceDeleted(String),

    /// Group-membership edge would create a cycle
    #[error("Membership cycle: group {group} is already contained in {member}")]
    GroupCycle { group: String, member: String },

    /// Group does not exist
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Conditional demote lost a concurrent-writer race
    #[error("Write conflict on chain {0}, retry")]
    WriteConflict(String),

    /// Unexpected invariant breakage; details go to the log, not the client
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Validation failure naming the offending request field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) | Error::Io(_) | Error::InitError(_) => "internal",
            Error::DatabaseNotFound(_) => "internal",
            Error::Json(_) => "validation",
            Error::Validation { .. } => "validation",
            Error::TypeNotFound(_) => "type_not_found",
            Error::TypeExists(_) => "type_exists",
            Error::SchemaValidationFailed(_) => "schema_validation_failed",
            Error::InvalidAcl(_) => "invalid_acl",
            Error::InvalidPrincipals(_) => "invalid_principals",
            Error::NotFound(_) => "not_found",
            Error::InvalidVersion { .. } => "invalid_version",
            Error::Forbidden(_) => "forbidden",
            Error::Unauthenticated => "unauthenticated",
            Error::AlreadyDeleted(_) => "already_deleted",
            Error::NotDeleted(_) => "not_deleted",
            Error::ResourceDeleted(_) => "resource_deleted",
            Error::GroupCycle { .. } => "group_cycle",
            Error::GroupNotFound(_) => "group_not_found",
            Error::WriteConflict(_) => "write_conflict",
            Error::Internal(_) => "internal",
        }
    }
}

/// Result type alias using Trellis's Error type
pub type Result<T> = std::result::Result<T, Error>;
