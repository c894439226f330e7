//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::connection::{ChargerConnection, WsFrameSource};
use super::upstream::UpstreamLink;
use crate::application::handlers::HandlerServices;
use crate::application::session::SharedSessionRegistry;
use crate::config::{AppConfig, ForwardingConfig};
use crate::domain::ForwardingDefaults;
use crate::shared::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
pub const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Settings a connection needs from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct OcppServerSettings {
    pub address: String,
    pub command_timeout: Duration,
    pub forwarding: ForwardingConfig,
}

impl From<&AppConfig> for OcppServerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            address: config.ws_address(),
            command_timeout: config.commands.timeout(),
            forwarding: config.forwarding.clone(),
        }
    }
}

/// OCPP WebSocket Server
pub struct OcppServer {
    settings: Arc<OcppServerSettings>,
    session_registry: SharedSessionRegistry,
    services: Arc<HandlerServices>,
    forwarding_defaults: Arc<ForwardingDefaults>,
    shutdown_signal: ShutdownSignal,
    connection_ids: Arc<AtomicU64>,
}

impl OcppServer {
    pub fn new(
        settings: OcppServerSettings,
        session_registry: SharedSessionRegistry,
        services: Arc<HandlerServices>,
        shutdown_signal: ShutdownSignal,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            session_registry,
            services,
            forwarding_defaults: Arc::new(ForwardingDefaults::default()),
            shutdown_signal,
            connection_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.settings.address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = listener.local_addr()?;
        info!("🔌 OCPP 1.6 gateway started on ws://{}", addr);
        info!(
            "   Charge points should connect to: ws://{}/ocpp/{{charge_point_id}}",
            addr
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = self.shutdown_signal.wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    info!(
                        connected = self.session_registry.count(),
                        "Open connections close on their own"
                    );
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = ConnectionContext {
            connection_id: self.connection_ids.fetch_add(1, Ordering::Relaxed),
            settings: self.settings.clone(),
            session_registry: self.session_registry.clone(),
            services: self.services.clone(),
            forwarding_defaults: self.forwarding_defaults.clone(),
            shutdown: self.shutdown_signal.clone(),
        };

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, ctx).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.session_registry
    }
}

struct ConnectionContext {
    connection_id: u64,
    settings: Arc<OcppServerSettings>,
    session_registry: SharedSessionRegistry,
    services: Arc<HandlerServices>,
    forwarding_defaults: Arc<ForwardingDefaults>,
    shutdown: ShutdownSignal,
}

/// Extract charge point ID from WebSocket request path.
/// Expected format: /ocpp/{charge_point_id} or /{charge_point_id}
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');

    if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_start_matches('/');
        if !id.is_empty() && !id.contains('/') {
            return Some(id.to_string());
        }
    }

    if !path.is_empty() && !path.contains('/') {
        return Some(path.to_string());
    }

    None
}

/// Echo `ocpp1.6` back when the client offers it.
pub(crate) fn negotiate_subprotocol(req: &Request, mut response: Response) -> Response {
    let requested_protocols = req
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let supports_ocpp16 = requested_protocols
        .split(',')
        .map(|s| s.trim())
        .any(|p| p == OCPP_SUBPROTOCOL);

    if supports_ocpp16 {
        response.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(OCPP_SUBPROTOCOL),
        );
        debug!("OCPP 1.6 subprotocol accepted");
    } else if !requested_protocols.is_empty() {
        warn!(
            "Client does not support ocpp1.6, requested: {}",
            requested_protocols
        );
    }
    response
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnectionContext,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("New connection from: {}", addr);

    let mut charge_point_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, response: Response| {
            let path = req.uri().path();
            info!("WebSocket handshake from: {}, path: {}", addr, path);
            charge_point_id = extract_charge_point_id(path);
            Ok(negotiate_subprotocol(req, response))
        },
    )
    .await?;

    let charge_point_id = charge_point_id.unwrap_or_else(|| format!("CP_{}", addr.port()));
    info!(charge_point_id = charge_point_id.as_str(), %addr, "Connected");

    let (mut ws_sender, ws_receiver) = ws_stream.split();
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<String>();

    // Outgoing message sender task
    let cp_id_send = charge_point_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            debug!(charge_point_id = cp_id_send.as_str(), "-> {}", msg);
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                error!(charge_point_id = cp_id_send.as_str(), error = %e, "Send error");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let (mut connection, commands) = ChargerConnection::open(
        charge_point_id.clone(),
        ctx.connection_id,
        ctx.services.clone(),
        ctx.session_registry.clone(),
        outbox,
        ctx.settings.command_timeout,
    );

    if let Some(meta) = ctx.settings.forwarding.resolve(&charge_point_id) {
        match UpstreamLink::connect(
            &meta.peer_url,
            &charge_point_id,
            meta.policy.clone(),
            ctx.forwarding_defaults.clone(),
            connection.queue(),
        )
        .await
        {
            Ok(link) => connection = connection.with_upstream(link, meta),
            Err(e) => warn!(
                charge_point_id = charge_point_id.as_str(),
                peer_url = meta.peer_url.as_str(),
                error = %e,
                "Forwarding peer unreachable, serving without relay"
            ),
        }
    }

    let source = WsFrameSource::new(
        charge_point_id.clone(),
        ws_receiver,
        ctx.session_registry.clone(),
    );
    connection.run(source, commands, ctx.shutdown).await;

    // The connection dropped its outbox, so the writer drains and closes.
    if let Err(e) = send_task.await {
        warn!(charge_point_id = charge_point_id.as_str(), error = %e, "Writer task failed");
    }

    Ok(())
}
