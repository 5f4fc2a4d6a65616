//! HTTP API handlers for the submission gateway

pub mod health;
pub mod submit;

pub use health::health_routes;
pub use submit::submit_routes;
