//! Observability events raised by the coordinator.

use crate::error::PipelineError;

/// Broadcast to every subscriber of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Served from the cache
    Hit { url: String, encoding: String },
    /// Served through the pipeline
    Miss { url: String, encoding: String },
    /// A pipeline stage failed
    Error(PipelineError),
    /// Informational message (refreshes, watch failures)
    Notice(String),
}

/// Capacity of the broadcast channel; slow subscribers lag rather than block.
pub const EVENT_CAPACITY: usize = 256;
