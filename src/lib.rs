// src/lib.rs

//! Trellis - versioned property graph store
//!
//! Multi-tenant graph storage over SQLite, exposed as JSON over HTTP.
//!
//! # Architecture
//!
//! - Versioned rows: every mutation inserts a new row chained to its
//!   predecessor; history and inter-version diffs stay retrievable
//! - Chain handles: any historical row id resolves to the latest row
//! - Content-addressed ACLs: identical entry sets share one record;
//!   group membership forms a DAG resolved by transitive closure
//! - Typed property bags: free-form JSON validated against per-type
//!   JSON Schemas (Draft-07)
//! - Cursor-paginated listings with JSON1 property filtering

pub mod acl;
pub mod cache;
pub mod chain;
pub mod db;
pub mod diff;
mod error;
pub mod graph;
pub mod query;
pub mod server;
pub mod store;
pub mod validate;

pub use acl::{AclFilter, PrincipalSet};
pub use db::models::{
    Acl, AclEntry, Group, GroupMember, Permission, PrincipalType, ResourceKind, ResourceRow,
    TypeCategory, TypeDef,
};
pub use diff::{PropertyDiff, diff_properties};
pub use error::{Error, Result};
pub use validate::{ValidationIssue, ValidationReport};
