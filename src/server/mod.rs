// src/server/mod.rs

//! Trellis HTTP server
//!
//! JSON over HTTP surface for the versioned graph store: typed entities
//! and links with version chains, content-addressed ACLs, cursor-paged
//! listings, rich property search, and graph traversal.

pub mod auth;
mod handlers;
pub mod metrics;
pub mod response;
mod routes;

pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use routes::create_router;

use crate::acl::DEFAULT_FILTER_CUTOFF;
use crate::cache::TtlCache;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Path to the Trellis database
    pub db_path: String,
    /// TTL for cached entity-read responses
    pub entity_cache_ttl: Duration,
    /// TTL for memoized principal closures
    pub principals_cache_ttl: Duration,
    /// Accessible-ACL set size above which listings switch from the
    /// in-query filter shape to post-query filtering
    pub acl_filter_cutoff: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            db_path: "/var/lib/trellis/trellis.db".to_string(),
            entity_cache_ttl: Duration::from_secs(60),
            principals_cache_ttl: Duration::from_secs(120),
            acl_filter_cutoff: DEFAULT_FILTER_CUTOFF,
        }
    }
}

/// Shared server state
pub struct ServerState {
    pub config: ServerConfig,
    pub cache: TtlCache,
    pub metrics: ServerMetrics,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            cache: TtlCache::new(),
            metrics: ServerMetrics::new(),
        }
    }
}

/// Shared handle passed to every handler
pub type SharedState = Arc<RwLock<ServerState>>;

/// Start the Trellis server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Trellis server on {}", config.bind_addr);
    tracing::info!("Database: {}", config.db_path);
    tracing::info!("ACL filter cutoff: {}", config.acl_filter_cutoff);

    let state: SharedState = Arc::new(RwLock::new(ServerState::new(config.clone())));
    let app = create_router(state.clone());

    // Sweep expired cache entries in the background
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let guard = sweep_state.read().await;
            let purged = guard.cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!("purged {} expired cache entries", purged);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Trellis is ready to serve");

    axum::serve(listener, app).await?;
    Ok(())
}
