//! Asset Cache - in-process asset cache and delivery pipeline
//!
//! Serves files through a bounded multi-encoding cache with LRU eviction, TTL expiry,
//! gzip compression, ETags and file-watch invalidation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheStore, CacheType};
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Coordinator, CoordinatorBuilder, FetchRequest, Resource, SetOptions};
pub use tasks::spawn_expiry_task;
