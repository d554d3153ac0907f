//! Nexa inference gateway entry point.
//!
//! Reads configuration from the file named by `NEXA_CONFIG` (optional) and
//! the environment, then starts the axum-based HTTP gateway.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NEXA_CONFIG` | *(none)* | Path to a TOML/YAML/JSON config file. |
//! | `GATEWAY_PORT` | `3000` | TCP port to listen on. |
//! | `MODEL_DIR` | `models` | Directory holding model artifacts and the manifest. |
//! | `CACHE_TTL_SECS` | `3600` | Response cache entry lifetime. |
//! | `REQUEST_TIMEOUT_MS` | `30000` | Overall per-request deadline. |
//! | `QUOTA_FAIL_OPEN` | `false` | Admit requests while the quota store is down. |
//! | `RUST_LOG` | `nexa_gateway=info` | `tracing` filter directives. |

use nexa_gateway::config::{GatewayServerConfig, LogFormat};
use nexa_gateway::server::GatewayServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nexa_gateway=info,tower_http=info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::var("NEXA_CONFIG").ok();
    let config = match GatewayServerConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load gateway configuration: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(config.log_format);

    info!(
        port = config.port,
        model_dir = %config.model_dir.display(),
        tenants = config.tenants.len(),
        cache_ttl_secs = config.cache_ttl_secs,
        request_timeout_ms = config.request_timeout_ms,
        quota_fail_open = config.quota_fail_open,
        admin_enabled = config.admin_api_key.is_some(),
        "Nexa gateway configuration loaded"
    );

    if let Err(e) = GatewayServer::new(config).start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}
