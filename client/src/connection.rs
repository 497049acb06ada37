use std::borrow::Cow;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use huddle_protocol::{ClientEvent, MessageType, ParseError, parse_server_event};

use crate::SyncError;
use crate::chat::ChatSessions;
use crate::config::SyncConfig;
use crate::events::{LifecycleEvent, SyncEvent};
use crate::router::{EventRouter, Subscription};
use crate::subscriptions::{SubscriptionKind, SubscriptionRegistry};
use crate::typing::TypingTracker;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnect backoff parameters.
pub struct ReconnectPolicy {
    /// Retry ceiling; None retries forever.
    pub max_attempts: Option<usize>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based):
    /// `min(initial × multiplier^attempt, max)`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let scaled =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }

    /// Whether another retry is allowed after `attempts` failures.
    pub fn allows(&self, attempts: usize) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Connection lifecycle state, readable from the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal until the next explicit connect: the reconnect ceiling was
    /// exceeded or the credential was rejected.
    Failed,
}

/// Commands from the handle to the driver task.
pub(crate) enum Command {
    Connect(String),
    Disconnect,
    Shutdown,
    JoinRoom(String),
    LeaveRoom(String),
    SendMessage {
        room_id: String,
        content: String,
        message_type: MessageType,
        correlation_id: String,
    },
    RetrySend {
        room_id: String,
        correlation_id: String,
    },
    TypingStart(String),
    TypingStop(String),
    Subscribe(SubscriptionKind, String),
    Unsubscribe(SubscriptionKind, String),
    /// Raw outbound emission, used by the Connected-replay handlers.
    EmitWire(ClientEvent),
}

enum Tick {
    Command(Option<Command>),
    Inbound(Option<Result<WsMessage, WsError>>),
    Reconnect,
    Sweep,
}

/// Owns the socket lifecycle.
///
/// At most one live transport handle exists at any time: every connect
/// tears down the previous stream before establishing a new one, and every
/// other component reaches the network only through commands processed
/// here.
pub(crate) struct ConnectionManager {
    config: SyncConfig,
    router: EventRouter,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    chat: ChatSessions,
    typing: TypingTracker,
    state: Arc<RwLock<ConnectionState>>,
    commands: mpsc::UnboundedReceiver<Command>,
    stream: Option<WsStream>,
    credential: Option<String>,
    attempts: usize,
    reconnect_at: Option<tokio::time::Instant>,
    /// Keeps the core component routes registered for the driver's
    /// lifetime.
    _routes: Vec<Subscription>,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SyncConfig,
        router: EventRouter,
        registry: Arc<RwLock<SubscriptionRegistry>>,
        chat: ChatSessions,
        typing: TypingTracker,
        state: Arc<RwLock<ConnectionState>>,
        commands: mpsc::UnboundedReceiver<Command>,
        routes: Vec<Subscription>,
    ) -> Self {
        Self {
            config,
            router,
            registry,
            chat,
            typing,
            state,
            commands,
            stream: None,
            credential: None,
            attempts: 0,
            reconnect_at: None,
            _routes: routes,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let tick = {
                let commands = &mut self.commands;
                let stream = &mut self.stream;
                let deadline = self.reconnect_at;

                tokio::select! {
                    cmd = commands.recv() => Tick::Command(cmd),
                    inbound = next_inbound(stream) => Tick::Inbound(inbound),
                    _ = wait_until(deadline), if deadline.is_some() => Tick::Reconnect,
                    _ = sweep.tick() => Tick::Sweep,
                }
            };

            match tick {
                Tick::Command(None) | Tick::Command(Some(Command::Shutdown)) => {
                    self.teardown("shutting down").await;
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                Tick::Command(Some(cmd)) => self.handle_command(cmd).await,
                Tick::Inbound(inbound) => self.handle_inbound(inbound).await,
                Tick::Reconnect => {
                    self.reconnect_at = None;
                    self.try_establish().await;
                }
                Tick::Sweep => self.sweep_pending(),
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(credential) => self.connect(credential).await,
            Command::Disconnect => {
                self.credential = None;
                self.reconnect_at = None;
                self.attempts = 0;
                self.teardown("user disconnect").await;
                self.set_state(ConnectionState::Disconnected);
                self.router
                    .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::Disconnected));
            }
            Command::JoinRoom(room_id) => {
                self.chat.begin_join(&room_id);
                let event = self
                    .with_registry(|registry| registry.subscribe(SubscriptionKind::Room, &room_id));
                if let Some(event) = event.flatten() {
                    self.send_wire(event).await;
                }
            }
            Command::LeaveRoom(room_id) => {
                self.chat.leave(&room_id);
                self.typing.clear_room(&room_id);
                let event = self.with_registry(|registry| {
                    registry.unsubscribe(SubscriptionKind::Room, &room_id)
                });
                if let Some(event) = event.flatten() {
                    self.send_wire(event).await;
                }
            }
            Command::SendMessage {
                room_id,
                content,
                message_type,
                correlation_id,
            } => {
                let result = self.chat.begin_send(
                    &room_id,
                    &content,
                    message_type,
                    &correlation_id,
                    Instant::now(),
                );
                match result {
                    Ok(event) => self.send_wire(event).await,
                    Err(reason) => {
                        tracing::warn!(room = %room_id, %reason, "send rejected");
                        self.router
                            .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::SendFailed {
                                room_id,
                                correlation_id,
                            }));
                    }
                }
            }
            Command::RetrySend {
                room_id,
                correlation_id,
            } => {
                let result = self
                    .chat
                    .retry_send(&room_id, &correlation_id, Instant::now());
                match result {
                    Ok(event) => self.send_wire(event).await,
                    Err(reason) => {
                        tracing::warn!(room = %room_id, %reason, "retry rejected");
                    }
                }
            }
            Command::TypingStart(room_id) => {
                self.send_wire(ClientEvent::TypingStart(room_id)).await;
            }
            Command::TypingStop(room_id) => {
                self.send_wire(ClientEvent::TypingStop(room_id)).await;
            }
            Command::Subscribe(kind, id) => {
                let event = self.with_registry(|registry| registry.subscribe(kind, &id));
                if let Some(event) = event.flatten() {
                    self.send_wire(event).await;
                }
            }
            Command::Unsubscribe(kind, id) => {
                let event = self.with_registry(|registry| registry.unsubscribe(kind, &id));
                if let Some(event) = event.flatten() {
                    self.send_wire(event).await;
                }
            }
            Command::EmitWire(event) => self.send_wire(event).await,
            Command::Shutdown => {}
        }
    }

    async fn handle_inbound(&mut self, inbound: Option<Result<WsMessage, WsError>>) {
        match inbound {
            Some(Ok(WsMessage::Text(text))) => self.handle_frame(&text),
            Some(Ok(WsMessage::Ping(data))) => {
                if let Some(ws) = self.stream.as_mut()
                    && let Err(e) = ws.send(WsMessage::Pong(data)).await
                {
                    tracing::warn!(error = %e, "failed to send pong");
                }
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                self.on_transport_lost("server closed connection").await;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "websocket error");
                self.on_transport_lost("websocket error").await;
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match parse_server_event(text) {
            Ok(event) => {
                self.router.dispatch(&SyncEvent::Server(event));
            }
            Err(ParseError::UnknownEvent(name)) => {
                tracing::debug!(event = %name, "unknown event dropped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed inbound frame dropped");
            }
        }
    }

    async fn connect(&mut self, credential: String) {
        if self.current_state() == ConnectionState::Connected {
            tracing::debug!("connect ignored: already connected");
            return;
        }

        self.credential = Some(credential);
        self.reconnect_at = None;
        self.attempts = 0;
        self.teardown("fresh connect").await;
        self.set_state(ConnectionState::Connecting);
        self.try_establish().await;
    }

    async fn try_establish(&mut self) {
        let Some(credential) = self.credential.clone() else {
            return;
        };

        match establish(&self.config.url, &credential).await {
            Ok(ws) => {
                self.stream = Some(ws);
                self.on_connected();
            }
            Err(SyncError::AuthRejected) => {
                tracing::warn!("handshake rejected, credential presumed stale");
                self.credential = None;
                self.reconnect_at = None;
                self.set_state(ConnectionState::Failed);
                self.router
                    .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::AuthRejected));
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect attempt failed");
                self.schedule_reconnect();
            }
        }
    }

    fn on_connected(&mut self) {
        self.attempts = 0;
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connected);
        // The registry and chat handlers react to this by enqueueing their
        // replay emissions as EmitWire commands.
        self.router
            .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::Connected));
        tracing::info!("connected");
    }

    async fn on_transport_lost(&mut self, reason: &str) {
        tracing::warn!(reason, "transport lost");
        self.teardown(reason).await;

        if self.credential.is_some() {
            self.schedule_reconnect();
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.config.reconnect.allows(self.attempts) {
            tracing::error!(attempts = self.attempts, "reconnect ceiling exceeded");
            self.reconnect_at = None;
            self.set_state(ConnectionState::Failed);
            self.router
                .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::ConnectionFailed));
            return;
        }

        let delay = self.config.reconnect.delay_for(self.attempts);
        self.attempts += 1;
        self.reconnect_at = Some(tokio::time::Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        self.router
            .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::Reconnecting {
                attempt: self.attempts,
                delay,
            }));
        tracing::info!(attempt = self.attempts, ?delay, "reconnect scheduled");
    }

    async fn teardown(&mut self, reason: &str) {
        if let Some(mut ws) = self.stream.take() {
            tracing::debug!(reason, "closing transport");
            if let Err(e) = ws.close(None).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
        }
    }

    /// Emit one outbound event. Drops with a log when not Connected:
    /// outbound events are not queued across disconnects; callers that
    /// need at-least-once re-emit after the Connected replay.
    async fn send_wire(&mut self, event: ClientEvent) {
        if self.current_state() != ConnectionState::Connected {
            tracing::debug!(event = event.name(), "emit dropped: not connected");
            return;
        }
        let Some(ws) = self.stream.as_mut() else {
            tracing::debug!(event = event.name(), "emit dropped: no transport");
            return;
        };

        if let Err(e) = ws.send(WsMessage::Text(event.to_wire())).await {
            tracing::warn!(error = %e, event = event.name(), "send failed");
            self.on_transport_lost("send failure").await;
        }
    }

    fn sweep_pending(&mut self) {
        for (room_id, correlation_id) in self.chat.expire_pending(Instant::now()) {
            tracing::warn!(room = %room_id, correlation = %correlation_id, "send timed out");
            self.router
                .dispatch(&SyncEvent::Lifecycle(LifecycleEvent::SendFailed {
                    room_id,
                    correlation_id,
                }));
        }
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut SubscriptionRegistry) -> R) -> Option<R> {
        self.registry
            .write()
            .ok()
            .map(|mut registry| f(&mut registry))
    }

    fn current_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }
}

async fn next_inbound(stream: &mut Option<WsStream>) -> Option<Result<WsMessage, WsError>> {
    match stream {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Ensure the URL has a path component so the handshake request-target is
/// well-formed. A pathless authority (`ws://host`) renders as `GET ?token=…`,
/// which servers reject; this inserts the root `/` to yield `GET /?token=…`.
fn ensure_path(url: &str) -> Cow<'_, str> {
    if let Some((_, rest)) = url.split_once("://") {
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        if rest.as_bytes().get(authority_end) != Some(&b'/') {
            let idx = url.len() - rest.len() + authority_end;
            return Cow::Owned(format!("{}/{}", &url[..idx], &url[idx..]));
        }
    }
    Cow::Borrowed(url)
}

/// Open the transport, carrying the credential as a handshake query
/// parameter. A 401/403 from the server is an auth rejection; anything
/// else is a transport failure eligible for reconnect.
async fn establish(url: &str, credential: &str) -> Result<WsStream, SyncError> {
    let base = ensure_path(url);
    let separator = if base.contains('?') { '&' } else { '?' };
    let url = format!("{base}{separator}token={}", urlencoding::encode(credential));

    match connect_async(url.as_str()).await {
        Ok((ws, _response)) => Ok(ws),
        Err(WsError::Http(response))
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            Err(SyncError::AuthRejected)
        }
        Err(e) => Err(SyncError::Transport(e)),
    }
}
