use engine::{ClientConfig, Connector, LoopConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use super::connection::WebSocketConnector;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) connector: Box<dyn Connector>,
}

/// Returns `None` when the configuration cannot be loaded; the reason has
/// already been logged.
pub(crate) fn build_app() -> Option<AppWiring> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "=== Gridclash Startup ===");

    let client_config = match ClientConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "config_load_failed");
            return None;
        }
    };

    Some(AppWiring {
        config: client_config.loop_config(),
        connector: Box::new(WebSocketConnector::new(client_config.server_url)),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
