//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is alive.
//!
//! # Tasks
//! - TTL Sweep: Clears expired weak entries at the configured interval

mod cleanup;

pub use cleanup::spawn_expiry_task;
