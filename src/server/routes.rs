// src/server/routes.rs
//! Axum router configuration for the Trellis server

use crate::server::SharedState;
use crate::server::handlers::{admin, entities, groups, links, search, types};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router
pub fn create_router(state: SharedState) -> Router {
    // CORS configuration - permissive for now
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Entities
        .route("/entities", post(entities::create).get(entities::list))
        .route(
            "/entities/:id",
            get(entities::read)
                .put(entities::update)
                .delete(entities::remove),
        )
        .route("/entities/:id/restore", post(entities::restore))
        .route("/entities/:id/versions", get(entities::versions))
        .route("/entities/:id/versions/:n", get(entities::version))
        .route("/entities/:id/history", get(entities::history))
        // Graph traversal
        .route("/entities/:id/outbound", get(entities::outbound))
        .route("/entities/:id/inbound", get(entities::inbound))
        .route("/entities/:id/neighbors", get(entities::neighbors))
        // ACL management
        .route(
            "/entities/:id/acl",
            get(entities::read_acl).put(entities::put_acl),
        )
        // Links (symmetric surface, no traversal endpoints)
        .route("/links", post(links::create).get(links::list))
        .route(
            "/links/:id",
            get(links::read).put(links::update).delete(links::remove),
        )
        .route("/links/:id/restore", post(links::restore))
        .route("/links/:id/versions", get(links::versions))
        .route("/links/:id/versions/:n", get(links::version))
        .route("/links/:id/history", get(links::history))
        .route("/links/:id/acl", get(links::read_acl).put(links::put_acl))
        // Type registry
        .route("/types", get(types::list).post(types::create))
        .route("/types/:id", get(types::read))
        // Group administration
        .route("/groups", get(groups::list).post(groups::create))
        .route(
            "/groups/:id/members",
            get(groups::members)
                .post(groups::add_member)
                .delete(groups::remove_member),
        )
        // Rich property search
        .route("/search", post(search::search))
        // Admin endpoints
        .route("/admin/stats", get(admin::stats))
        // Layers
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
