//! Moderation worker (jokes-moderate) - Main entry point
//!
//! Startup order:
//! 1. Load configuration and initialize tracing
//! 2. Open the local type cache (works without the broker)
//! 3. Start the broker supervisor; each (re)connect restarts the cache subscriber
//! 4. Serve HTTP until Ctrl+C / SIGTERM

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jokes_common::api::shutdown_signal;
use jokes_common::broker::{spawn_supervisor, AmqpBroker, ConnectionManager, Topology};
use jokes_common::config::{
    resolve_cache_path, resolve_port, resolve_type_update_queue, BrokerSettings, ConfigSource,
    TomlConfig,
};
use jokes_common::logging;
use jokes_common::type_cache::{start_cache_subscriber, TypeCache};
use jokes_moderate::{build_router, AppState, DEFAULT_PORT, MODULE};
use tracing::{info, warn};

/// Command-line arguments for jokes-moderate
#[derive(Parser, Debug)]
#[command(name = "jokes-moderate")]
#[command(about = "Moderation worker for the joke moderation pipeline")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 3100]
    #[arg(short, long, env = "JOKES_MODERATE_PORT")]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "JOKES_CONFIG")]
    config: Option<PathBuf>,

    /// AMQP broker URL
    #[arg(long, env = "JOKES_BROKER_URL")]
    broker_url: Option<String>,

    /// Seconds between reconnect attempts
    #[arg(long, env = "JOKES_RECONNECT_SECS")]
    reconnect_secs: Option<u64>,

    /// Type cache file
    #[arg(long, env = "JOKES_MODERATE_CACHE_PATH")]
    cache_path: Option<PathBuf>,

    /// Private queue bound to the taxonomy exchange
    #[arg(long, env = "JOKES_MODERATE_TYPE_QUEUE")]
    type_queue: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml, source) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    logging::init(&logging::directives("jokes_moderate", &toml.logging.level));

    // Build identification first, before any network waits
    info!(
        "Starting joke moderation worker (jokes-moderate) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &source {
        ConfigSource::File(path) => info!("Configuration: {}", path.display()),
        ConfigSource::Defaults => warn!("No configuration file found, using defaults"),
    }

    let broker_settings = BrokerSettings::resolve(args.broker_url, args.reconnect_secs, &toml);
    let cache_path = resolve_cache_path(args.cache_path, &toml, MODULE);
    let type_queue = resolve_type_update_queue(args.type_queue, &toml, MODULE);
    let port = resolve_port(args.port, &toml, DEFAULT_PORT);

    let cache = Arc::new(
        TypeCache::open(&cache_path)
            .await
            .with_context(|| format!("Failed to open type cache at {}", cache_path.display()))?,
    );
    info!("Type cache: {} ({} types)", cache_path.display(), cache.len().await);

    let broker = Arc::new(AmqpBroker::new(
        broker_settings.url.clone(),
        Topology::pipeline(Some(&type_queue)),
    ));
    info!(
        "Broker: {} (reconnect every {:?}), taxonomy queue '{}'",
        broker_settings.url, broker_settings.reconnect.interval, type_queue
    );

    let supervisor = {
        let cache = cache.clone();
        spawn_supervisor(broker.clone(), broker_settings.reconnect, move |broker| {
            let cache = cache.clone();
            let type_queue = type_queue.clone();
            async move { start_cache_subscriber(broker.as_ref(), &type_queue, MODULE, cache).await }
        })
    };

    let app = build_router(AppState::new(broker.clone(), cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("jokes-moderate listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    supervisor.abort();
    broker.teardown().await;
    info!("Server shutdown complete");
    Ok(())
}
