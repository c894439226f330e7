//! Per-charger connection task
//!
//! One task owns the read half of a charger socket. It answers inbound
//! calls, executes queued [`OutboundCommand`]s one at a time and relays
//! traffic to a forwarding peer when one is configured.
//!
//! ```text
//!   socket ──► FrameSource ──┐
//!                            ├──► ChargerConnection ──► outbox ──► writer task
//!   command queue ───────────┘            │
//!                                         └──► UpstreamLink (optional)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::upstream::UpstreamLink;
use crate::application::commands::{trigger_message, CommandError, CommandOrigin, OutboundCommand};
use crate::application::correlation::{
    await_result, CallError, DeadlineSource, FrameSource, InboundCallHandler,
};
use crate::application::handlers::{v16_action_matcher, CallContext, HandlerServices};
use crate::application::session::{
    ConnectionHandle, ConsumerSessionState, ForwardingMeta, SharedSessionRegistry,
};
use crate::domain::OcppVersion;
use crate::shared::{OcppFrame, ShutdownSignal};

/// Inbound text of a websocket read half
pub struct WsFrameSource<S> {
    charge_point_id: String,
    stream: SplitStream<WebSocketStream<S>>,
    registry: SharedSessionRegistry,
}

impl<S> WsFrameSource<S> {
    pub fn new(
        charge_point_id: impl Into<String>,
        stream: SplitStream<WebSocketStream<S>>,
        registry: SharedSessionRegistry,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            stream,
            registry,
        }
    }
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = self.charge_point_id.as_str(), "<- {}", text);
                    self.registry.touch(&self.charge_point_id);
                    return Some(text);
                }
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => {
                        self.registry.touch(&self.charge_point_id);
                        return Some(text);
                    }
                    Err(_) => {
                        warn!(
                            charge_point_id = self.charge_point_id.as_str(),
                            "Binary message is not UTF-8, ignoring"
                        );
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    info!(charge_point_id = self.charge_point_id.as_str(), ?frame, "Close frame received");
                    return None;
                }
                Err(e) => {
                    warn!(charge_point_id = self.charge_point_id.as_str(), error = %e, "WebSocket error");
                    return None;
                }
            }
        }
    }
}

/// Answers inbound calls for one connection, including those that arrive
/// while a command response is awaited.
pub struct InboundDispatch<'a> {
    pub charge_point_id: &'a str,
    pub services: &'a HandlerServices,
    pub state: &'a mut ConsumerSessionState,
    pub outbox: &'a mpsc::UnboundedSender<String>,
    pub self_queue: &'a mpsc::UnboundedSender<OutboundCommand>,
    pub upstream: Option<&'a UpstreamLink>,
}

impl InboundDispatch<'_> {
    fn relay_upstream(&mut self, frame: &OcppFrame, action: &str) {
        let (Some(link), Some(meta)) = (self.upstream, self.state.forwarding_meta.as_mut()) else {
            return;
        };
        if meta.policy.allows_message(&link.defaults().messages, action) {
            if link.relay(frame) {
                meta.relayed_messages += 1;
            }
        } else {
            meta.blocked += 1;
            debug!(
                charge_point_id = self.charge_point_id,
                action, "Message not relayed to peer"
            );
        }
    }
}

#[async_trait]
impl<'a> InboundCallHandler for InboundDispatch<'a> {
    async fn on_call(&mut self, frame: &OcppFrame) -> bool {
        let OcppFrame::Call {
            unique_id,
            action,
            payload,
        } = frame
        else {
            return false;
        };

        let mut ctx = CallContext {
            charge_point_id: self.charge_point_id,
            services: self.services,
            state: &mut *self.state,
            self_queue: self.self_queue,
        };
        let reply = match v16_action_matcher(&mut ctx, action, payload).await {
            Some(response) => OcppFrame::result(unique_id.as_str(), response),
            None => OcppFrame::error_response(
                unique_id.as_str(),
                "NotImplemented",
                format!("Action {} is not supported", action),
            ),
        };
        if self.outbox.send(reply.encode()).is_err() {
            debug!(
                charge_point_id = self.charge_point_id,
                message_id = unique_id.as_str(),
                "Writer gone, reply dropped"
            );
        }

        self.relay_upstream(frame, action);
        true
    }
}

/// Connection task state for one charger
pub struct ChargerConnection {
    charge_point_id: String,
    connection_id: u64,
    services: Arc<HandlerServices>,
    registry: SharedSessionRegistry,
    state: ConsumerSessionState,
    outbox: mpsc::UnboundedSender<String>,
    self_queue: mpsc::UnboundedSender<OutboundCommand>,
    upstream: Option<UpstreamLink>,
    command_timeout: Duration,
}

impl ChargerConnection {
    /// Register a new connection and return it with its command queue.
    pub fn open(
        charge_point_id: impl Into<String>,
        connection_id: u64,
        services: Arc<HandlerServices>,
        registry: SharedSessionRegistry,
        outbox: mpsc::UnboundedSender<String>,
        command_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundCommand>) {
        let charge_point_id = charge_point_id.into();
        let (self_queue, commands) = mpsc::unbounded_channel();
        registry.register(ConnectionHandle::new(
            connection_id,
            charge_point_id.clone(),
            self_queue.clone(),
            OcppVersion::V16,
        ));

        let connection = Self {
            state: ConsumerSessionState::new(charge_point_id.clone()),
            charge_point_id,
            connection_id,
            services,
            registry,
            outbox,
            self_queue,
            upstream: None,
            command_timeout,
        };
        (connection, commands)
    }

    /// Relay traffic through `link` under `meta`'s policy.
    pub fn with_upstream(mut self, link: UpstreamLink, meta: ForwardingMeta) -> Self {
        self.state.forwarding_meta = Some(meta);
        self.upstream = Some(link);
        self
    }

    /// Queue feeding this connection's command loop.
    pub fn queue(&self) -> mpsc::UnboundedSender<OutboundCommand> {
        self.self_queue.clone()
    }

    pub fn state(&self) -> &ConsumerSessionState {
        &self.state
    }

    /// Serve until the socket closes or shutdown is signalled, then tear
    /// the session down.
    pub async fn run<S>(
        mut self,
        mut source: S,
        mut commands: mpsc::UnboundedReceiver<OutboundCommand>,
        shutdown: ShutdownSignal,
    ) where
        S: FrameSource,
    {
        info!(
            charge_point_id = self.charge_point_id.as_str(),
            connection_id = self.connection_id,
            "Connection task started"
        );

        loop {
            tokio::select! {
                text = source.recv() => match text {
                    Some(text) => self.handle_inbound(&text).await,
                    None => {
                        info!(charge_point_id = self.charge_point_id.as_str(), "Charge point disconnected");
                        break;
                    }
                },
                Some(command) = commands.recv() => {
                    if !self.execute(&mut source, command).await {
                        break;
                    }
                }
                _ = shutdown.wait() => {
                    info!(charge_point_id = self.charge_point_id.as_str(), "Connection closing due to server shutdown");
                    break;
                }
            }
        }

        self.teardown(commands).await;
    }

    async fn handle_inbound(&mut self, text: &str) {
        let frame = match OcppFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(charge_point_id = self.charge_point_id.as_str(), error = %e, "Discarding malformed frame");
                metrics::counter!("ocpp_frames_discarded_total", "reason" => "decode").increment(1);
                return;
            }
        };

        if frame.is_call() {
            let mut dispatch = InboundDispatch {
                charge_point_id: &self.charge_point_id,
                services: &self.services,
                state: &mut self.state,
                outbox: &self.outbox,
                self_queue: &self.self_queue,
                upstream: self.upstream.as_ref(),
            };
            dispatch.on_call(&frame).await;
        } else {
            debug!(
                charge_point_id = self.charge_point_id.as_str(),
                message_id = frame.unique_id(),
                "Response with no outstanding call"
            );
            metrics::counter!("ocpp_frames_discarded_total", "reason" => "unmatched").increment(1);
        }
    }

    /// Send one command and wait for its answer. Returns `false` once the
    /// connection is gone.
    async fn execute<S>(&mut self, source: &mut S, mut command: OutboundCommand) -> bool
    where
        S: FrameSource,
    {
        let frame = OcppFrame::call(
            command.message_id.as_str(),
            command.action.as_str(),
            command.payload.clone(),
        );
        if self.outbox.send(frame.encode()).is_err() {
            command.complete(Err(CommandError::ConnectionClosed));
            return false;
        }
        command.notify_sent();

        match command.origin {
            CommandOrigin::Consumption => {
                self.state.consumption_message_id = Some(command.message_id.clone());
            }
            CommandOrigin::Relay => {
                if let Some(meta) = self.state.forwarding_meta.as_mut() {
                    meta.relayed_calls += 1;
                }
            }
            CommandOrigin::Api => {}
        }

        let mut dispatch = InboundDispatch {
            charge_point_id: &self.charge_point_id,
            services: &self.services,
            state: &mut self.state,
            outbox: &self.outbox,
            self_queue: &self.self_queue,
            upstream: self.upstream.as_ref(),
        };
        // The deadline only applies between frames; a call being answered
        // always finishes.
        let mut bounded = DeadlineSource::new(source, Instant::now() + self.command_timeout);
        let outcome = await_result(&mut bounded, &command.message_id, Some(&mut dispatch)).await;

        let result = match outcome {
            Ok(payload) => Ok(payload),
            Err(CallError::ConnectionClosed(_)) if bounded.expired() => Err(CommandError::Timeout),
            Err(e) => Err(CommandError::from(e)),
        };
        let label = match &result {
            Ok(_) => "ok",
            Err(CommandError::CallError { .. }) => "call_error",
            Err(CommandError::Timeout) => "timeout",
            Err(_) => "closed",
        };
        metrics::counter!(
            "ocpp_commands_total",
            "origin" => command.origin.as_str(),
            "outcome" => label
        )
        .increment(1);

        if let Err(e) = &result {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                action = command.action.as_str(),
                message_id = command.message_id.as_str(),
                error = %e,
                "Command did not complete"
            );
        }

        if command.origin == CommandOrigin::Consumption {
            self.settle_consumption_poll(&command.message_id, &result);
        }

        let closed = matches!(result, Err(CommandError::ConnectionClosed));
        command.complete(result);
        !closed
    }

    /// Keep the outstanding poll id only while the charger agreed to send
    /// meter values for it.
    fn settle_consumption_poll(&mut self, message_id: &str, result: &Result<Value, CommandError>) {
        let accepted = match result {
            Ok(payload) => trigger_message::is_accepted(payload.clone()).unwrap_or(false),
            Err(_) => false,
        };
        if !accepted && self.state.consumption_message_id.as_deref() == Some(message_id) {
            debug!(
                charge_point_id = self.charge_point_id.as_str(),
                message_id,
                "Meter value trigger not accepted"
            );
            self.state.consumption_message_id = None;
        }
    }

    async fn teardown(self, mut commands: mpsc::UnboundedReceiver<OutboundCommand>) {
        let Self {
            charge_point_id,
            connection_id,
            registry,
            state,
            upstream,
            ..
        } = self;

        registry.unregister(&charge_point_id, connection_id);
        state.teardown().await;
        if let Some(link) = upstream {
            link.close();
        }

        commands.close();
        let mut dropped = 0usize;
        while let Ok(command) = commands.try_recv() {
            command.complete(Err(CommandError::ConnectionClosed));
            dropped += 1;
        }
        if dropped > 0 {
            debug!(charge_point_id = charge_point_id.as_str(), dropped, "Failed queued commands");
        }

        info!(charge_point_id = charge_point_id.as_str(), connection_id, "Disconnected");
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::services;
    use crate::application::services::RfidAttemptRecorder;
    use crate::application::session::SessionRegistry;
    use crate::domain::{TagAuthorizer, TagDecision};
    use crate::infrastructure::storage::InMemoryRfidAttemptRepository;
    use crate::shared::DomainResult;
    use serde_json::json;

    struct ChannelSource(mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn recv(&mut self) -> Option<String> {
            self.0.recv().await
        }
    }

    struct Harness {
        registry: SharedSessionRegistry,
        inbound: mpsc::UnboundedSender<String>,
        written: mpsc::UnboundedReceiver<String>,
        shutdown: ShutdownSignal,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(command_timeout: Duration) -> Harness {
        start_with(services(&["AB12CD34"]), command_timeout)
    }

    fn start_with(services: HandlerServices, command_timeout: Duration) -> Harness {
        let registry = SessionRegistry::shared();
        let (outbox, written) = mpsc::unbounded_channel();
        let (inbound, source) = mpsc::unbounded_channel();
        let (connection, commands) = ChargerConnection::open(
            "CP001",
            1,
            Arc::new(services),
            registry.clone(),
            outbox,
            command_timeout,
        );
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(connection.run(ChannelSource(source), commands, shutdown.clone()));
        Harness {
            registry,
            inbound,
            written,
            shutdown,
            task,
        }
    }

    async fn next_frame(h: &mut Harness) -> OcppFrame {
        let text = tokio::time::timeout(Duration::from_secs(1), h.written.recv())
            .await
            .unwrap()
            .unwrap();
        OcppFrame::decode(&text).unwrap()
    }

    #[tokio::test]
    async fn answers_inbound_calls() {
        let mut h = start(Duration::from_secs(1));
        assert!(h.registry.is_connected("CP001"));

        h.inbound
            .send(r#"[2,"b1","BootNotification",{"chargePointVendor":"Acme","chargePointModel":"X1"}]"#.into())
            .unwrap();
        match next_frame(&mut h).await {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "b1");
                assert_eq!(payload["status"], "Accepted");
            }
            other => panic!("unexpected frame {:?}", other),
        }

        h.inbound.send(r#"[2,"r1","Reset",{"type":"Soft"}]"#.into()).unwrap();
        match next_frame(&mut h).await {
            OcppFrame::CallError {
                unique_id,
                error_code,
                ..
            } => {
                assert_eq!(unique_id, "r1");
                assert_eq!(error_code, "NotImplemented");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn command_reply_is_correlated_while_calls_interleave() {
        let mut h = start(Duration::from_secs(1));
        let (command, reply) = OutboundCommand::api("cmd-1", "ChangeAvailability", json!({}))
            .with_reply();
        h.registry.submit("CP001", command).unwrap();

        let call = next_frame(&mut h).await;
        assert_eq!(call.unique_id(), "cmd-1");
        assert_eq!(call.action(), Some("ChangeAvailability"));

        h.inbound.send(r#"[2,"hb","Heartbeat",{}]"#.into()).unwrap();
        let heartbeat = next_frame(&mut h).await;
        assert_eq!(heartbeat.unique_id(), "hb");
        assert!(heartbeat.is_call_result());

        h.inbound.send(r#"[3,"stale",{}]"#.into()).unwrap();
        h.inbound
            .send(r#"[3,"cmd-1",{"status":"Scheduled"}]"#.into())
            .unwrap();
        let payload: Value = reply.await.unwrap().unwrap();
        assert_eq!(payload["status"], "Scheduled");
    }

    #[tokio::test]
    async fn silent_charger_times_out_and_connection_survives() {
        let mut h = start(Duration::from_millis(50));
        let (command, reply) = OutboundCommand::api("cmd-1", "ClearCache", json!({})).with_reply();
        h.registry.submit("CP001", command).unwrap();
        next_frame(&mut h).await;
        assert_eq!(reply.await.unwrap(), Err(CommandError::Timeout));

        h.inbound.send(r#"[2,"hb","Heartbeat",{}]"#.into()).unwrap();
        assert!(next_frame(&mut h).await.is_call_result());
    }

    struct SlowAuthorizer(Duration);

    #[async_trait]
    impl TagAuthorizer for SlowAuthorizer {
        async fn authorize(&self, _id_tag: &str) -> DomainResult<TagDecision> {
            tokio::time::sleep(self.0).await;
            Ok(TagDecision {
                accepted: true,
                account_id: None,
            })
        }
    }

    #[tokio::test]
    async fn command_timeout_lets_a_started_call_finish() {
        let recorder = Arc::new(RfidAttemptRecorder::new(Arc::new(
            InMemoryRfidAttemptRepository::new(),
        )));
        let services =
            HandlerServices::new(recorder, Arc::new(SlowAuthorizer(Duration::from_millis(300))))
                .with_consumption_interval(Duration::ZERO);
        let mut h = start_with(services, Duration::from_millis(100));

        let (command, reply) = OutboundCommand::api("cmd-1", "ClearCache", json!({})).with_reply();
        h.registry.submit("CP001", command).unwrap();
        assert_eq!(next_frame(&mut h).await.unique_id(), "cmd-1");

        h.inbound
            .send(
                r#"[2,"s1","StartTransaction",{"connectorId":1,"idTag":"AB12CD34","meterStart":0,"timestamp":"2024-01-01T00:00:00Z"}]"#
                    .into(),
            )
            .unwrap();

        assert_eq!(reply.await.unwrap(), Err(CommandError::Timeout));
        match next_frame(&mut h).await {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "s1");
                assert_eq!(payload["idTagInfo"]["status"], "Accepted");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_fails_pending_command_and_unregisters() {
        let mut h = start(Duration::from_secs(5));
        let (command, reply) = OutboundCommand::api("cmd-1", "ClearCache", json!({})).with_reply();
        h.registry.submit("CP001", command).unwrap();
        next_frame(&mut h).await;

        drop(h.inbound);
        assert_eq!(reply.await.unwrap(), Err(CommandError::ConnectionClosed));
        h.task.await.unwrap();
        assert!(!h.registry.is_connected("CP001"));
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let h = start(Duration::from_secs(1));
        h.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.registry.count(), 0);
    }

    #[tokio::test]
    async fn start_transaction_triggers_meter_value_poll() {
        let mut h = start(Duration::from_secs(1));
        h.inbound
            .send(
                r#"[2,"s1","StartTransaction",{"connectorId":1,"idTag":"AB12CD34","meterStart":0,"timestamp":"2024-01-01T00:00:00Z"}]"#
                    .into(),
            )
            .unwrap();
        let started = next_frame(&mut h).await;
        assert!(started.is_call_result());

        // test services poll every 20ms
        let poll = next_frame(&mut h).await;
        assert_eq!(poll.action(), Some("TriggerMessage"));
        let poll_id = poll.unique_id().to_string();

        h.inbound
            .send(format!(r#"[3,"{}",{{"status":"Accepted"}}]"#, poll_id))
            .unwrap();
        h.inbound
            .send(
                r#"[2,"m1","MeterValues",{"connectorId":1,"meterValue":[{"timestamp":"2024-01-01T00:00:01Z","sampledValue":[{"value":"10"}]}]}]"#
                    .into(),
            )
            .unwrap();

        loop {
            let frame = next_frame(&mut h).await;
            if frame.unique_id() == "m1" {
                assert!(frame.is_call_result());
                break;
            }
        }
    }

    #[tokio::test]
    async fn accepted_poll_records_outstanding_id_until_meter_values() {
        let registry = SessionRegistry::shared();
        let (outbox, mut written) = mpsc::unbounded_channel();
        let (inbound, source) = mpsc::unbounded_channel::<String>();
        let (mut connection, _commands) = ChargerConnection::open(
            "CP001",
            1,
            Arc::new(services(&[])),
            registry,
            outbox,
            Duration::from_secs(1),
        );
        let mut source = ChannelSource(source);

        let command = OutboundCommand::new(
            "poll-1",
            trigger_message::ACTION,
            json!({"requestedMessage": "MeterValues", "connectorId": 1}),
            CommandOrigin::Consumption,
        );
        inbound
            .send(r#"[3,"poll-1",{"status":"Accepted"}]"#.into())
            .unwrap();
        assert!(connection.execute(&mut source, command).await);
        assert!(written.recv().await.unwrap().contains("TriggerMessage"));
        assert_eq!(
            connection.state().consumption_message_id.as_deref(),
            Some("poll-1")
        );

        connection
            .handle_inbound(
                r#"[2,"m1","MeterValues",{"connectorId":1,"meterValue":[{"timestamp":"2024-01-01T00:00:01Z","sampledValue":[{"value":"10"}]}]}]"#,
            )
            .await;
        assert!(OcppFrame::decode(&written.recv().await.unwrap())
            .unwrap()
            .is_call_result());
        assert!(connection.state().consumption_message_id.is_none());
    }

    #[tokio::test]
    async fn rejected_poll_clears_outstanding_id() {
        let registry = SessionRegistry::shared();
        let (outbox, mut written) = mpsc::unbounded_channel();
        let (inbound, source) = mpsc::unbounded_channel::<String>();
        let (mut connection, _commands) = ChargerConnection::open(
            "CP001",
            1,
            Arc::new(services(&[])),
            registry,
            outbox,
            Duration::from_secs(1),
        );
        let mut source = ChannelSource(source);

        let command = OutboundCommand::new(
            "poll-1",
            trigger_message::ACTION,
            json!({"requestedMessage": "MeterValues", "connectorId": 1}),
            CommandOrigin::Consumption,
        );
        inbound
            .send(r#"[3,"poll-1",{"status":"Rejected"}]"#.into())
            .unwrap();
        assert!(connection.execute(&mut source, command).await);
        assert!(written.recv().await.unwrap().contains("TriggerMessage"));
        assert!(connection.state().consumption_message_id.is_none());
    }
}
