//! Request and Response models for the cache admin API
//!
//! DTOs used for serializing/deserializing the `/_cache` endpoints.

pub mod requests;
pub mod responses;

pub use requests::{ClearRequest, SetRequest};
pub use responses::{
    ClearResponse, ErrorResponse, HealthResponse, SetResponse, StatsResponse,
};
