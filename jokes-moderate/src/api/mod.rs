//! HTTP API handlers for the moderation worker

pub mod health;
pub mod moderation;

pub use health::health_routes;
pub use moderation::moderation_routes;
