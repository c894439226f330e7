//! OCPP Gateway CLI Server
//!
//! Headless OCPP 1.6 gateway suitable for deployment as a systemd service,
//! Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-gateway/config.toml)
//! ocpp-gateway
//!
//! # Custom config path
//! ocpp-gateway --config /etc/ocpp-gateway/config.toml
//!
//! # Override the WebSocket port
//! ocpp-gateway --ws-port 9000
//!
//! # Validate config without starting
//! ocpp-gateway --check
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use ocpp_gateway::config::AppConfig;
use ocpp_gateway::server::{init_tracing, ServerHandle, ServerOptions};

/// OCPP 1.6 gateway for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-gateway",
    version,
    about = "OCPP 1.6 gateway for EV charging stations",
    long_about = "WebSocket server that answers OCPP 1.6 charge points, issues \
                  central-system commands and relays traffic to a forwarding peer.\n\n\
                  Default config: ~/.config/ocpp-gateway/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(ocpp_gateway::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            if cli.check {
                error!("Invalid configuration {}: {}", config_path.display(), e);
                return Err(e.into());
            }
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.ws_port {
        info!("CLI override: ws_port = {}", port);
        config.server.ws_port = port;
    }
    if let Some(ref level) = cli.log_level {
        info!("CLI override: log_level = {}", level);
        config.logging.level = level.clone();
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   WS address  : {}", config.ws_address());
        println!("   Database    : {}", config.database.connection_url());
        println!("   Log level   : {}", config.logging.level);
        println!("   Forwarding  : {}", config.forwarding.enabled);
        return Ok(());
    }

    // ── Metrics exporter ───────────────────────────────────────
    if config.metrics.enabled {
        match config.metrics.listen.parse::<SocketAddr>() {
            Ok(addr) => match PrometheusBuilder::new().with_http_listener(addr).install() {
                Ok(()) => info!("📈 Prometheus metrics on http://{}/metrics", addr),
                Err(e) => error!("Failed to install metrics exporter: {}", e),
            },
            Err(e) => warn!("Invalid metrics.listen '{}': {}", config.metrics.listen, e),
        }
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await?;

    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
