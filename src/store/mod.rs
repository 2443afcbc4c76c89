// src/store/mod.rs

//! Versioned resource store
//!
//! The write side of the graph: create, update, soft-delete, restore,
//! and ACL changes for entities and links, each emitting a new version
//! row. All writes run the demote + insert pair inside one transaction
//! with a conditional demote, so a lost race surfaces as a conflict
//! instead of a forked chain.

mod resources;
mod types;

pub use resources::{NewResource, create, get_latest, get_version, list_versions, restore,
                    set_acl, soft_delete, update};
pub use types::{create_type, get_type, list_types};
