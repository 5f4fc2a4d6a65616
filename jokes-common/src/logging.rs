//! Tracing subscriber setup shared by every service binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_directives` is used, e.g.
/// `"jokes_etl=info,jokes_common=info,tower_http=debug"`.
pub fn init(default_directives: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build filter directives for a crate at a given level
///
/// The common library always logs at the same level as the service.
pub fn directives(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},jokes_common={level},tower_http=info,lapin=warn")
}
