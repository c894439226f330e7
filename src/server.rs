//! Reusable OCPP gateway server runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full server lifecycle:
//! database init, migrations, protocol registry, OCPP WebSocket server and
//! graceful shutdown.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, error, info, warn};

use crate::application::commands::{create_command_sender, SharedCommandSender};
use crate::application::handlers::{register_v16_handlers, HandlerServices};
use crate::application::protocol::{ProtocolCatalog, ProtocolRegistry, SharedProtocolRegistry};
use crate::application::services::{DeploymentTracker, RfidAttemptRecorder};
use crate::application::session::{SessionRegistry, SharedSessionRegistry};
use crate::application::NetworkProfileDeployer;
use crate::config::AppConfig;
use crate::domain::{CallDirection, OcppVersion, StaticTagAuthorizer};
use crate::infrastructure::database::migrator::Migrator;
use crate::infrastructure::{
    init_database, DatabaseConfig, SeaOrmDeploymentRepository, SeaOrmRfidAttemptRepository,
};
use crate::interfaces::ws::{OcppServer, OcppServerSettings};
use crate::shared::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the OCPP gateway.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running OCPP gateway.
///
/// # Examples
///
/// ```rust,no_run
/// use ocpp_gateway::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Active WebSocket session registry.
    pub session_registry: SharedSessionRegistry,
    /// Command sender for CSMS-initiated calls.
    pub command_sender: SharedCommandSender,
    /// Handlers bound per protocol and direction.
    pub protocol_registry: SharedProtocolRegistry,
    /// RFID attempt audit trail.
    pub rfid_attempts: Arc<RfidAttemptRecorder>,
    /// Network profile rollout state.
    pub deployments: Arc<DeploymentTracker>,
    /// SetNetworkProfile orchestration.
    pub network_profiles: Arc<NetworkProfileDeployer>,
    /// The configuration the server was started with.
    pub config: AppConfig,

    db: DatabaseConnection,
    shutdown: ShutdownSignal,
    ws_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Start the gateway with the given options.
    ///
    /// This will:
    /// 1. Connect to database and run migrations
    /// 2. Register protocol handlers and report catalog coverage
    /// 3. Start the OCPP WebSocket server
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;

        info!("Starting OCPP gateway...");

        // ── Database ───────────────────────────────────────────
        let db_config = DatabaseConfig {
            url: app_cfg.database.connection_url(),
        };
        let db = init_database(&db_config).await?;

        if opts.auto_migrate {
            info!("Running database migrations...");
            Migrator::up(&db, None).await?;
            info!("Migrations completed");
        }

        // ── Repositories & Services ────────────────────────────
        let rfid_attempts = Arc::new(RfidAttemptRecorder::new(Arc::new(
            SeaOrmRfidAttemptRepository::new(db.clone()),
        )));
        let deployments = Arc::new(DeploymentTracker::new(Arc::new(
            SeaOrmDeploymentRepository::new(db.clone()),
        )));

        let authorizer = Arc::new(StaticTagAuthorizer::new(
            app_cfg.authorization.accepted_tags.iter(),
        ));
        if app_cfg.authorization.accepted_tags.is_empty() {
            warn!("No accepted tags configured; every non-empty idTag is accepted");
        }
        let services = Arc::new(
            HandlerServices::new(rfid_attempts.clone(), authorizer)
                .with_heartbeat_interval(app_cfg.server.heartbeat_interval)
                .with_consumption_interval(app_cfg.consumption.poll_interval()),
        );

        // ── Session & Command infrastructure ───────────────────
        let session_registry = SessionRegistry::shared();
        let command_sender =
            create_command_sender(session_registry.clone(), app_cfg.commands.timeout());
        let network_profiles = Arc::new(NetworkProfileDeployer::new(
            command_sender.clone(),
            deployments.clone(),
        ));

        // ── Protocol registry ──────────────────────────────────
        let protocol_registry = ProtocolRegistry::shared();
        register_v16_handlers(&protocol_registry);
        report_coverage(&protocol_registry, &ProtocolCatalog::builtin_ocpp16());

        // ── OCPP WebSocket server ──────────────────────────────
        let shutdown = ShutdownSignal::new();
        let server = OcppServer::new(
            OcppServerSettings::from(&app_cfg),
            session_registry.clone(),
            services,
            shutdown.clone(),
        );

        let ws_task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("WebSocket server error: {}", e);
            }
        });

        info!("🚀 Gateway started.");

        Ok(Self {
            session_registry,
            command_sender,
            protocol_registry,
            rfid_attempts,
            deployments,
            network_profiles,
            config: app_cfg,
            db,
            shutdown,
            ws_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the server to fully stop after shutdown has been triggered.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");

        let grace = std::time::Duration::from_secs(self.config.server.shutdown_timeout);
        match tokio::time::timeout(grace, self.ws_task).await {
            Ok(Ok(())) => info!("WebSocket server stopped"),
            Ok(Err(e)) => error!("WebSocket server task panicked: {}", e),
            Err(_) => warn!("WebSocket server did not stop within {:?}", grace),
        }

        // Give connection tasks a moment to unregister.
        let deadline = tokio::time::Instant::now() + grace;
        while self.session_registry.count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        if self.session_registry.count() > 0 {
            warn!(
                remaining = self.session_registry.count(),
                "Connections still open at shutdown"
            );
        }

        if let Err(e) = self.db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("✅ Database connection closed");
        }

        info!("👋 OCPP gateway shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down OCPP gateway...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the server is still running.
    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Log catalog calls with no bound handler. Charger-initiated gaps are
/// warnings; unimplemented central-system commands are expected.
fn report_coverage(registry: &ProtocolRegistry, catalog: &ProtocolCatalog) {
    let protocol = OcppVersion::V16.slug();
    let missing = registry.missing_calls(protocol, catalog);
    let inbound_prefix = format!("{}:", CallDirection::CpToCsms.as_str());
    let (inbound, outbound): (Vec<_>, Vec<_>) = missing
        .iter()
        .partition(|call| call.starts_with(&inbound_prefix));

    if !inbound.is_empty() {
        warn!(protocol, missing = ?inbound, "Charge-point calls without a handler");
    }
    if !outbound.is_empty() {
        debug!(protocol, missing = ?outbound, "Central-system calls not issued by this gateway");
    }
    info!(
        protocol,
        bound = registry.iter_all().count(),
        "Protocol handlers registered"
    );
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
