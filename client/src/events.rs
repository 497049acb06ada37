use std::time::Duration;

use huddle_protocol::{EntityKind, ServerEvent};

/// Everything the router delivers: inbound wire events plus lifecycle
/// notifications, so UI layers subscribe to both the same way.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Server(ServerEvent),
    Lifecycle(LifecycleEvent),
}

/// Connection and business-failure notifications.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The connection (re-)entered Connected. Subscription replay and
    /// pending-send retries hang off this.
    Connected,

    /// User-initiated disconnect completed.
    Disconnected,

    /// A reconnect attempt has been scheduled.
    Reconnecting { attempt: usize, delay: Duration },

    /// The reconnect ceiling was exceeded; the client will not retry on
    /// its own. Show the persistent offline indicator.
    ConnectionFailed,

    /// The handshake was rejected. The credential is presumed stale, so
    /// there is no retry.
    AuthRejected,

    /// A queued chat send saw no correlated echo within the bound. The
    /// message is marked Failed; retrying is a user action.
    SendFailed {
        room_id: String,
        correlation_id: String,
    },
}

/// Registration key for router handlers, one per event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    ProjectUpdate,
    ChallengeUpdate,
    SquadUpdate,
    GeneralPostUpdate,
    UserTyping,
    UserStoppedTyping,
    SquadJoined,
    Connected,
    Disconnected,
    Reconnecting,
    ConnectionFailed,
    AuthRejected,
    SendFailed,
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Server(event) => match event {
                ServerEvent::NewMessage(_) => EventKind::NewMessage,
                ServerEvent::Counter(update) => match update.entity_kind {
                    EntityKind::Project => EventKind::ProjectUpdate,
                    EntityKind::Challenge => EventKind::ChallengeUpdate,
                    EntityKind::Squad => EventKind::SquadUpdate,
                    EntityKind::GeneralPost => EventKind::GeneralPostUpdate,
                },
                ServerEvent::UserTyping { .. } => EventKind::UserTyping,
                ServerEvent::UserStoppedTyping { .. } => EventKind::UserStoppedTyping,
                ServerEvent::SquadJoined { .. } => EventKind::SquadJoined,
            },
            Self::Lifecycle(event) => match event {
                LifecycleEvent::Connected => EventKind::Connected,
                LifecycleEvent::Disconnected => EventKind::Disconnected,
                LifecycleEvent::Reconnecting { .. } => EventKind::Reconnecting,
                LifecycleEvent::ConnectionFailed => EventKind::ConnectionFailed,
                LifecycleEvent::AuthRejected => EventKind::AuthRejected,
                LifecycleEvent::SendFailed { .. } => EventKind::SendFailed,
            },
        }
    }
}
