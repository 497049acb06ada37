mod chat;
mod config;
mod connection;
mod events;
mod reconcile;
mod router;
mod subscriptions;
mod typing;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::{Result, anyhow};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use huddle_protocol::{
    ClientEvent, CounterUpdate, EntityKind, MessageRecord, MessageType, OutboundMessage,
    ServerEvent, UpdateType,
};

pub use chat::{ChatSessions, DeliveryState, InboundOutcome, Message, RoomPhase, SendRejected};
pub use config::SyncConfig;
pub use connection::{ConnectionState, ReconnectPolicy};
pub use events::{EventKind, LifecycleEvent, SyncEvent};
pub use reconcile::{PatchRecord, Reconciler};
pub use router::{EventRouter, Subscription};
pub use subscriptions::{SubscriptionKind, SubscriptionRegistry};
pub use typing::TypingTracker;

use connection::{Command, ConnectionManager};

/// Failure taxonomy for the connection layer. Transport errors are handled
/// internally with reconnect backoff; auth rejections are terminal and
/// surfaced as a lifecycle event.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake rejected by server")]
    AuthRejected,
}

/// The realtime sync client.
///
/// Construct one per logged-in session, own it at the application's
/// composition root, and call [`SyncClient::shutdown`] on logout. The
/// client starts Disconnected; go live with
/// `client.handle().connect(credential)` and watch the outcome through
/// [`EventKind::Connected`] / [`EventKind::AuthRejected`] subscriptions.
pub struct SyncClient {
    handle: SyncHandle,
}

impl SyncClient {
    /// Build the component graph and spawn the driver task.
    ///
    /// `viewer_id` is the logged-in user's id; the reconciler uses it to
    /// tell the viewer's own counter echoes apart from other users', and
    /// chat sessions stamp it on optimistic messages.
    pub fn new(config: SyncConfig, viewer_id: &str) -> Self {
        let router = EventRouter::new();
        let reconciler = Reconciler::new(viewer_id);
        let typing = TypingTracker::new(config.typing_timeout);
        let chat = ChatSessions::new(viewer_id, config.send_timeout, config.max_pending_sends);
        let registry = Arc::new(RwLock::new(SubscriptionRegistry::new()));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let routes = wire_core_routes(&router, &reconciler, &typing, &chat, &registry, &commands);

        let manager = ConnectionManager::new(
            config,
            router.clone(),
            registry,
            chat.clone(),
            typing.clone(),
            state.clone(),
            command_rx,
            routes,
        );
        tokio::spawn(manager.run());

        Self {
            handle: SyncHandle {
                commands,
                router,
                state,
                reconciler,
                typing,
                chat,
            },
        }
    }

    /// A cloneable handle for the rest of the application.
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stop the driver and close the transport. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.handle.shutdown();
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
    }
}

/// Routes inbound events to the core components. Registration order
/// matters on Connected: the registry replays joins before chat retries
/// pending sends, so a retried message never races its room join.
fn wire_core_routes(
    router: &EventRouter,
    reconciler: &Reconciler,
    typing: &TypingTracker,
    chat: &ChatSessions,
    registry: &Arc<RwLock<SubscriptionRegistry>>,
    commands: &mpsc::UnboundedSender<Command>,
) -> Vec<Subscription> {
    let mut routes = Vec::new();

    for kind in [
        EventKind::ProjectUpdate,
        EventKind::ChallengeUpdate,
        EventKind::SquadUpdate,
        EventKind::GeneralPostUpdate,
    ] {
        let reconciler = reconciler.clone();
        routes.push(router.on(kind, move |event| {
            if let SyncEvent::Server(ServerEvent::Counter(update)) = event {
                reconciler.apply(update);
            }
        }));
    }

    {
        let typing = typing.clone();
        routes.push(router.on(EventKind::UserTyping, move |event| {
            if let SyncEvent::Server(ServerEvent::UserTyping { room_id, user_id }) = event {
                typing.mark_typing(room_id, user_id, Instant::now());
            }
        }));
    }
    {
        let typing = typing.clone();
        routes.push(router.on(EventKind::UserStoppedTyping, move |event| {
            if let SyncEvent::Server(ServerEvent::UserStoppedTyping { room_id, user_id }) = event {
                typing.mark_stopped(room_id, user_id);
            }
        }));
    }

    {
        let chat = chat.clone();
        routes.push(router.on(EventKind::NewMessage, move |event| {
            if let SyncEvent::Server(ServerEvent::NewMessage(record)) = event {
                chat.apply_inbound(record);
            }
        }));
    }
    {
        let chat = chat.clone();
        routes.push(router.on(EventKind::SquadJoined, move |event| {
            if let SyncEvent::Server(ServerEvent::SquadJoined { room_id }) = event {
                chat.confirm_join(room_id);
            }
        }));
    }

    {
        let registry = registry.clone();
        let commands = commands.clone();
        routes.push(router.on(EventKind::Connected, move |_event| {
            let Ok(registry) = registry.read() else {
                return;
            };
            for event in registry.replay() {
                let _ = commands.send(Command::EmitWire(event));
            }
        }));
    }
    {
        let chat = chat.clone();
        let commands = commands.clone();
        routes.push(router.on(EventKind::Connected, move |_event| {
            for event in chat.retry_pending(Instant::now()) {
                let _ = commands.send(Command::EmitWire(event));
            }
        }));
    }

    routes
}

/// Cloneable handle to a running [`SyncClient`]: commands in, state reads
/// out. All mutation happens on the driver task; reads see the driver's
/// latest state.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    router: EventRouter,
    state: Arc<RwLock<ConnectionState>>,
    reconciler: Reconciler,
    typing: TypingTracker,
    chat: ChatSessions,
}

impl SyncHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| anyhow!("sync client is shut down"))
    }

    /// Open (or re-open) the connection with a fresh credential. No-op if
    /// already connected.
    pub fn connect(&self, credential: &str) -> Result<()> {
        self.send(Command::Connect(credential.to_string()))
    }

    /// Tear down the transport and stop reconnecting. Declared interests
    /// and room logs survive for the next connect.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Stop the driver task entirely. The handle is useless afterwards.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Join a squad chat room and start tracking its log.
    pub fn join_room(&self, room_id: &str) -> Result<()> {
        self.send(Command::JoinRoom(room_id.to_string()))
    }

    /// Leave a room, discarding its log, pending sends and typing state.
    pub fn leave_room(&self, room_id: &str) -> Result<()> {
        self.send(Command::LeaveRoom(room_id.to_string()))
    }

    /// Queue a chat send. Returns the correlation id that identifies the
    /// optimistic message until the server's echo confirms it.
    pub fn send_message(
        &self,
        room_id: &str,
        content: &str,
        message_type: MessageType,
    ) -> Result<String> {
        let correlation_id = Uuid::new_v4().to_string();
        self.send(Command::SendMessage {
            room_id: room_id.to_string(),
            content: content.to_string(),
            message_type,
            correlation_id: correlation_id.clone(),
        })?;
        Ok(correlation_id)
    }

    /// Re-attempt a message previously marked Failed.
    pub fn retry_send(&self, room_id: &str, correlation_id: &str) -> Result<()> {
        self.send(Command::RetrySend {
            room_id: room_id.to_string(),
            correlation_id: correlation_id.to_string(),
        })
    }

    /// Tell the room the local user started composing.
    pub fn typing_start(&self, room_id: &str) -> Result<()> {
        self.send(Command::TypingStart(room_id.to_string()))
    }

    /// Tell the room the local user stopped composing.
    pub fn typing_stop(&self, room_id: &str) -> Result<()> {
        self.send(Command::TypingStop(room_id.to_string()))
    }

    /// Declare interest in a project's counter updates.
    pub fn subscribe_project(&self, project_id: &str) -> Result<()> {
        self.send(Command::Subscribe(
            SubscriptionKind::Project,
            project_id.to_string(),
        ))
    }

    pub fn unsubscribe_project(&self, project_id: &str) -> Result<()> {
        self.send(Command::Unsubscribe(
            SubscriptionKind::Project,
            project_id.to_string(),
        ))
    }

    /// Declare interest in a challenge's counter updates.
    pub fn subscribe_challenge(&self, challenge_id: &str) -> Result<()> {
        self.send(Command::Subscribe(
            SubscriptionKind::Challenge,
            challenge_id.to_string(),
        ))
    }

    pub fn unsubscribe_challenge(&self, challenge_id: &str) -> Result<()> {
        self.send(Command::Unsubscribe(
            SubscriptionKind::Challenge,
            challenge_id.to_string(),
        ))
    }

    /// Register a handler for one event kind. Dropping the returned token
    /// unregisters it.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl FnMut(&SyncEvent) + Send + 'static,
    ) -> Subscription {
        self.router.on(kind, handler)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Counter overlay for an entity, to lay over REST-fetched base data.
    pub fn patch_for(&self, entity_id: &str) -> Option<PatchRecord> {
        self.reconciler.patch_for(entity_id)
    }

    /// Drop the counter overlay for an entity when its screen unmounts.
    pub fn forget_patches(&self, entity_id: &str) {
        self.reconciler.forget(entity_id);
    }

    /// Users currently typing in a room, oldest mark first.
    pub fn typing_users_for(&self, room_id: &str) -> Vec<String> {
        self.typing.typing_users_for(room_id, Instant::now())
    }

    /// The room's message log in arrival order.
    pub fn room_log(&self, room_id: &str) -> Vec<Message> {
        self.chat.log(room_id)
    }

    /// Where the room is in its join lifecycle; None once left.
    pub fn room_phase(&self, room_id: &str) -> Option<RoomPhase> {
        self.chat.phase(room_id)
    }
}
