//! API Module
//!
//! HTTP front of the asset cache.
//!
//! # Endpoints
//! - `GET /_cache/health` - Health check endpoint
//! - `GET /_cache/stats` - Cache statistics
//! - `PUT /_cache/entries` - Explicit update of one URL
//! - `DELETE /_cache/entries?url=` - Drop a URL from the cache
//! - anything else - Served through the cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
