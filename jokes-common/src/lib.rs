//! # Jokes Common Library
//!
//! Shared code for the joke moderation services:
//! - Error taxonomy and HTTP mapping
//! - Configuration loading and logging setup
//! - Queue payloads and the taxonomy broadcast event
//! - Broker capability, AMQP connection manager and reconnect supervisor
//! - Consumer loop and message handler contract
//! - Locally persisted type cache
//! - Joke store contract with document and relational backends

pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod messages;
pub mod store;
pub mod type_cache;

pub use error::{Error, Result};
