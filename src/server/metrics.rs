// src/server/metrics.rs

//! Server metrics tracking
//!
//! Simple atomic counters for request/response statistics, exposed via
//! the admin stats endpoint. The ACL filter shape counters make the
//! in-query/post-query cutoff observable in production.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server metrics collector
#[derive(Default)]
pub struct ServerMetrics {
    /// Total requests
    requests_total: AtomicU64,
    /// Entity cache hits
    cache_hits: AtomicU64,
    /// Entity cache misses
    cache_misses: AtomicU64,
    /// Listings served with the in-query ACL filter shape
    acl_in_query: AtomicU64,
    /// Listings that fell back to the post-query ACL filter shape
    acl_post_query: AtomicU64,
    /// Writers that lost the conditional demote race
    write_conflicts: AtomicU64,
    /// Server start time
    start_time: std::sync::OnceLock<Instant>,
}

impl ServerMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        let metrics = Self::default();
        let _ = metrics.start_time.set(Instant::now());
        metrics
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an entity cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an entity cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record which ACL filter shape served a listing
    pub fn record_acl_shape(&self, post_query: bool) {
        if post_query {
            self.acl_post_query.fetch_add(1, Ordering::Relaxed);
        } else {
            self.acl_in_query.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a lost conditional demote
    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self
            .start_time
            .get()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);

        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_seconds: uptime.as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate_percent: hit_rate,
            acl_in_query: self.acl_in_query.load(Ordering::Relaxed),
            acl_post_query: self.acl_post_query.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate_percent: f64,
    pub acl_in_query: u64,
    pub acl_post_query: u64,
    pub write_conflicts: u64,
}
