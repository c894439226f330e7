//! Websocket link to a forwarding peer
//!
//! The gateway connects to the peer as if it were the charger itself
//! (`{peer_url}/{charge_point_id}`). Charger calls are copied upstream and
//! the peer's answers are ignored; the local central system stays
//! authoritative. Peer calls that pass the allow-list are queued on the
//! charger connection and their outcome is returned to the peer.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::ocpp_server::OCPP_SUBPROTOCOL;
use crate::application::commands::{CommandError, CommandOrigin, OutboundCommand};
use crate::domain::{ForwardingDefaults, ForwardingPolicy};
use crate::shared::OcppFrame;

pub struct UpstreamLink {
    charge_point_id: String,
    outbox: mpsc::UnboundedSender<String>,
    defaults: Arc<ForwardingDefaults>,
    task: JoinHandle<()>,
}

/// `{peer_url}/{charge_point_id}` with a single separating slash
pub fn peer_endpoint(peer_url: &str, charge_point_id: &str) -> String {
    format!("{}/{}", peer_url.trim().trim_end_matches('/'), charge_point_id)
}

impl UpstreamLink {
    /// Open the peer socket for `charge_point_id`. Allowed peer calls are
    /// pushed onto `charger_queue`.
    pub async fn connect(
        peer_url: &str,
        charge_point_id: &str,
        policy: ForwardingPolicy,
        defaults: Arc<ForwardingDefaults>,
        charger_queue: mpsc::UnboundedSender<OutboundCommand>,
    ) -> Result<Self, tokio_tungstenite::tungstenite::Error> {
        let endpoint = peer_endpoint(peer_url, charge_point_id);
        let mut request = endpoint.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(OCPP_SUBPROTOCOL),
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!(charge_point_id, endpoint = endpoint.as_str(), "Forwarding peer connected");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbox, mut outgoing) = mpsc::unbounded_channel::<String>();

        let cp_id = charge_point_id.to_string();
        let reply_outbox = outbox.clone();
        let task_defaults = defaults.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = outgoing.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                            warn!(charge_point_id = cp_id.as_str(), error = %e, "Peer send failed");
                            break;
                        }
                    }
                    msg = ws_receiver.next() => match msg {
                        Some(Ok(Message::Text(text))) => handle_peer_message(
                            &cp_id,
                            &text,
                            &policy,
                            &task_defaults,
                            &charger_queue,
                            &reply_outbox,
                        ),
                        Some(Ok(Message::Close(_))) | None => {
                            info!(charge_point_id = cp_id.as_str(), "Forwarding peer closed the link");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(charge_point_id = cp_id.as_str(), error = %e, "Forwarding peer error");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            charge_point_id: charge_point_id.to_string(),
            outbox,
            defaults,
            task,
        })
    }

    pub fn defaults(&self) -> &ForwardingDefaults {
        &self.defaults
    }

    pub fn is_open(&self) -> bool {
        !self.task.is_finished()
    }

    /// Copy a charger frame to the peer. Returns `false` when the link is
    /// down; the charger connection carries on regardless.
    pub fn relay(&self, frame: &OcppFrame) -> bool {
        if !self.is_open() || self.outbox.send(frame.encode()).is_err() {
            debug!(
                charge_point_id = self.charge_point_id.as_str(),
                message_id = frame.unique_id(),
                "Forwarding peer unavailable, frame not relayed"
            );
            return false;
        }
        true
    }

    pub fn close(self) {
        self.task.abort();
        debug!(charge_point_id = self.charge_point_id.as_str(), "Forwarding link closed");
    }
}

fn handle_peer_message(
    charge_point_id: &str,
    text: &str,
    policy: &ForwardingPolicy,
    defaults: &ForwardingDefaults,
    charger_queue: &mpsc::UnboundedSender<OutboundCommand>,
    outbox: &mpsc::UnboundedSender<String>,
) {
    let frame = match OcppFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(charge_point_id, error = %e, "Discarding malformed peer frame");
            return;
        }
    };

    let (unique_id, action, payload) = match frame {
        OcppFrame::Call {
            unique_id,
            action,
            payload,
        } => (unique_id, action, payload),
        other => {
            debug!(
                charge_point_id,
                message_id = other.unique_id(),
                "Ignoring peer response to relayed message"
            );
            return;
        }
    };

    if !policy.allows_call(&defaults.calls, &action) {
        info!(charge_point_id, action = action.as_str(), "Peer command blocked by allow-list");
        metrics::counter!("ocpp_relay_blocked_total", "direction" => "to_charger").increment(1);
        let refusal = OcppFrame::error_response(
            unique_id,
            "NotSupported",
            format!("{} is not forwarded to this charge point", action),
        );
        let _ = outbox.send(refusal.encode());
        return;
    }

    let (command, reply) =
        OutboundCommand::new(unique_id.clone(), action, payload, CommandOrigin::Relay).with_reply();
    if charger_queue.send(command).is_err() {
        let _ = outbox.send(
            OcppFrame::error_response(unique_id, "GenericError", "Charge point disconnected")
                .encode(),
        );
        return;
    }

    let outbox = outbox.clone();
    tokio::spawn(async move {
        let answer = match reply.await {
            Ok(Ok(payload)) => OcppFrame::result(unique_id, payload),
            Ok(Err(CommandError::CallError { code, description })) => {
                OcppFrame::error_response(unique_id, code, description)
            }
            Ok(Err(e)) => OcppFrame::error_response(unique_id, "GenericError", e.to_string()),
            Err(_) => OcppFrame::error_response(
                unique_id,
                "GenericError",
                CommandError::ConnectionClosed.to_string(),
            ),
        };
        let _ = outbox.send(answer.encode());
    });
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::ws::ocpp_server::negotiate_subprotocol;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    type PeerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    async fn peer() -> (String, JoinHandle<(String, PeerSocket)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut path = String::new();
            let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, response: Response| {
                path = req.uri().path().to_string();
                Ok(negotiate_subprotocol(req, response))
            })
            .await
            .unwrap();
            (path, ws)
        });
        (format!("ws://{}/ocpp/", addr), accept)
    }

    async fn next_text(ws: &mut PeerSocket) -> OcppFrame {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return OcppFrame::decode(&text).unwrap();
            }
        }
    }

    #[test]
    fn endpoint_joins_with_one_slash() {
        assert_eq!(peer_endpoint("ws://peer/ocpp/", "CP1"), "ws://peer/ocpp/CP1");
        assert_eq!(peer_endpoint("ws://peer/ocpp", "CP1"), "ws://peer/ocpp/CP1");
    }

    #[tokio::test]
    async fn relays_both_directions_under_policy() {
        let (url, accept) = peer().await;
        let (queue, mut commands) = mpsc::unbounded_channel();
        let link = UpstreamLink::connect(
            &url,
            "CP001",
            ForwardingPolicy::default(),
            Arc::new(ForwardingDefaults::default()),
            queue,
        )
        .await
        .unwrap();
        let (path, mut ws) = accept.await.unwrap();
        assert_eq!(path, "/ocpp/CP001");

        assert!(link.relay(&OcppFrame::call("hb-1", "Heartbeat", json!({}))));
        assert_eq!(next_text(&mut ws).await.unique_id(), "hb-1");

        ws.send(Message::Text(
            OcppFrame::call("p-1", "Reset", json!({"type": "Soft"})).encode(),
        ))
        .await
        .unwrap();
        let command = commands.recv().await.unwrap();
        assert_eq!(command.message_id, "p-1");
        assert_eq!(command.origin, CommandOrigin::Relay);
        command.complete(Ok(json!({"status": "Accepted"})));
        assert_eq!(
            next_text(&mut ws).await,
            OcppFrame::result("p-1", json!({"status": "Accepted"}))
        );

        ws.send(Message::Text(
            OcppFrame::call("p-2", "BootNotification", json!({})).encode(),
        ))
        .await
        .unwrap();
        match next_text(&mut ws).await {
            OcppFrame::CallError {
                unique_id,
                error_code,
                ..
            } => {
                assert_eq!(unique_id, "p-2");
                assert_eq!(error_code, "NotSupported");
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(commands.try_recv().is_err());

        link.close();
    }

    #[tokio::test]
    async fn charger_call_error_is_passed_to_peer() {
        let (url, accept) = peer().await;
        let (queue, mut commands) = mpsc::unbounded_channel();
        let _link = UpstreamLink::connect(
            &url,
            "CP001",
            ForwardingPolicy::default(),
            Arc::new(ForwardingDefaults::default()),
            queue,
        )
        .await
        .unwrap();
        let (_, mut ws) = accept.await.unwrap();

        ws.send(Message::Text(
            OcppFrame::call("p-1", "UnlockConnector", json!({"connectorId": 1})).encode(),
        ))
        .await
        .unwrap();
        let command = commands.recv().await.unwrap();
        command.complete(Err(CommandError::CallError {
            code: "InternalError".into(),
            description: "stuck".into(),
        }));
        match next_text(&mut ws).await {
            OcppFrame::CallError {
                error_code,
                error_description,
                ..
            } => {
                assert_eq!(error_code, "InternalError");
                assert_eq!(error_description, "stuck");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
