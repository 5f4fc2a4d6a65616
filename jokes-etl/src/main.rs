//! Persistence/ETL worker (jokes-etl) - Main entry point
//!
//! Startup order:
//! 1. Load configuration and initialize tracing
//! 2. Connect the configured store (fatal on failure)
//! 3. Start the broker supervisor; each (re)connect restarts the ingest consumer
//! 4. Serve the query API until Ctrl+C / SIGTERM

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jokes_common::api::shutdown_signal;
use jokes_common::broker::{spawn_supervisor, AmqpBroker, ConnectionManager, Topology};
use jokes_common::config::{
    resolve_port, BrokerSettings, ConfigSource, StoreBackend, StoreOverrides, StoreSettings,
    TomlConfig,
};
use jokes_common::logging;
use jokes_common::store::connect_store;
use jokes_etl::handler::start_ingest_consumer;
use jokes_etl::{build_router, AppState, DEFAULT_PORT, MODULE};
use tracing::{info, warn};

/// Command-line arguments for jokes-etl
#[derive(Parser, Debug)]
#[command(name = "jokes-etl")]
#[command(about = "Persistence worker and query API for the joke moderation pipeline")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 3000]
    #[arg(short, long, env = "JOKES_ETL_PORT")]
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

    /// Store backend: mongo or sql
    #[arg(long, env = "JOKES_STORE_BACKEND")]
    store_backend: Option<StoreBackend>,

    /// MongoDB connection string
    #[arg(long, env = "JOKES_MONGO_URL")]
    mongo_url: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "JOKES_MONGO_DATABASE")]
    mongo_database: Option<String>,

    /// SQL database URL
    #[arg(long, env = "JOKES_SQL_URL")]
    sql_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml, source) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    logging::init(&logging::directives("jokes_etl", &toml.logging.level));

    info!(
        "Starting joke ETL worker (jokes-etl) v{} [{}] built {} ({})",
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
    let store_settings = StoreSettings::resolve(
        StoreOverrides {
            backend: args.store_backend,
            mongo_url: args.mongo_url,
            mongo_database: args.mongo_database,
            sql_url: args.sql_url,
        },
        &toml,
    );
    let port = resolve_port(args.port, &toml, DEFAULT_PORT);

    let store = connect_store(&store_settings)
        .await
        .with_context(|| format!("Failed to connect {} store", store_settings.backend))?;

    let broker = Arc::new(AmqpBroker::new(
        broker_settings.url.clone(),
        Topology::pipeline(None),
    ));
    info!(
        "Broker: {} (reconnect every {:?})",
        broker_settings.url, broker_settings.reconnect.interval
    );

    let supervisor = {
        let store = store.clone();
        spawn_supervisor(broker.clone(), broker_settings.reconnect, move |broker| {
            let store = store.clone();
            async move { start_ingest_consumer(broker, store, MODULE).await }
        })
    };

    let app = build_router(AppState::new(store, broker.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("jokes-etl listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    supervisor.abort();
    broker.teardown().await;
    info!("Server shutdown complete");
    Ok(())
}
