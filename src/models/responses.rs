//! Response DTOs for the cache admin API

use serde::Serialize;

use crate::cache::CacheStats;
use crate::pipeline::{Artifact, ETAG};

/// Response body for `PUT /_cache/entries`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub url: String,
    /// Encodings the update produced
    pub encodings: Vec<String>,
    pub etag: Option<String>,
}

impl SetResponse {
    pub fn new(url: impl Into<String>, artifact: &Artifact) -> Self {
        let mut encodings = vec![artifact.plain.encoding.clone()];
        if let Some(compressed) = &artifact.compressed {
            encodings.push(compressed.encoding.clone());
        }
        Self {
            url: url.into(),
            encodings,
            etag: artifact.plain.headers.get(ETAG).cloned(),
        }
    }
}

/// Response body for `DELETE /_cache/entries`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub url: String,
    /// Whether anything was removed
    pub cleared: bool,
}

/// Response body for the stats endpoint (GET /_cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Current number of cached entries, every encoding counted
    pub total_entries: usize,
    /// Current sum of entry sizes in bytes
    pub total_size: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Whether no pipeline or update is in flight
    pub ready: bool,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, ready: bool) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            total_size: stats.total_size,
            hit_rate: stats.hit_rate(),
            ready,
        }
    }
}

/// Response body for the health endpoint (GET /_cache/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for rejected admin requests
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
