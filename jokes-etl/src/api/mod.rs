//! HTTP API handlers for the ETL worker

pub mod health;
pub mod jokes;

pub use health::health_routes;
pub use jokes::joke_routes;
