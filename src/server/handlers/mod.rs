// src/server/handlers/mod.rs

//! HTTP handlers for the Trellis surface
//!
//! Entity and link endpoints are symmetric; the shared versioned-resource
//! logic lives in `resources` and the per-kind modules stay thin.

pub mod admin;
pub mod entities;
pub mod groups;
pub mod links;
mod resources;
pub mod search;
pub mod types;

use crate::db;
use crate::error::Result;
use crate::server::ServerConfig;
use rusqlite::Connection;

/// Open the database for one request
pub(crate) fn open_db(config: &ServerConfig) -> Result<Connection> {
    db::open(&config.db_path)
}

/// Current unix time, the `created_at` of any row written now
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
