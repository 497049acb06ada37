use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

use huddle_protocol::{ClientEvent, MessageRecord, MessageType, OutboundMessage};

/// Delivery status of a message in the local log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Appended optimistically, waiting for the correlated echo.
    Pending,
    /// The server's broadcast replaced the optimistic entry.
    Confirmed,
    /// No echo arrived within the bound; retrying is a user action.
    Failed,
}

/// Join-state machine for a room. Leaving has no wire acknowledgment, so
/// `leave` collapses straight back to not-tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Joining,
    Joined,
}

/// One entry in a room's ordered message log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Correlation id while Pending, server-issued id once Confirmed.
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: String,
    pub edited: bool,
    pub delivery: DeliveryState,
}

/// What `apply_inbound` did with a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Matched a pending correlation and replaced the entry in place.
    ConfirmedPending,
    /// Appended to the log as someone else's (or an uncorrelated) message.
    Appended,
    /// The room is not tracked; the broadcast was dropped.
    NotJoined,
}

/// Reasons a send is refused before it reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("room is not joined")]
    NotJoined,

    #[error("pending-send queue is full")]
    PendingFull,

    #[error("no failed message with that correlation id")]
    NothingToRetry,
}

struct PendingSend {
    correlation_id: String,
    content: String,
    message_type: MessageType,
    deadline: Instant,
}

struct ChatRoom {
    phase: RoomPhase,
    messages: Vec<Message>,
    pending: Vec<PendingSend>,
}

impl ChatRoom {
    fn new() -> Self {
        Self {
            phase: RoomPhase::Joining,
            messages: Vec::new(),
            pending: Vec::new(),
        }
    }
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<String, ChatRoom>,
}

/// Per-room ordered message logs with bounded optimistic send queues.
///
/// Chat history is not persisted: leaving a room discards its log, and the
/// long-term history lives server-side, re-fetched on the next join.
#[derive(Clone)]
pub struct ChatSessions {
    viewer_id: Arc<str>,
    send_timeout: Duration,
    max_pending: usize,
    rooms: Arc<RwLock<RoomTable>>,
}

impl ChatSessions {
    pub fn new(viewer_id: &str, send_timeout: Duration, max_pending: usize) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            send_timeout,
            max_pending,
            rooms: Arc::new(RwLock::new(RoomTable::default())),
        }
    }

    /// Start tracking a room in the Joining phase. No-op if already
    /// tracked.
    pub fn begin_join(&self, room_id: &str) {
        if let Ok(mut table) = self.rooms.write() {
            table.rooms.entry(room_id.to_string()).or_insert_with(ChatRoom::new);
        }
    }

    /// The server acknowledged the join.
    pub fn confirm_join(&self, room_id: &str) {
        if let Ok(mut table) = self.rooms.write()
            && let Some(room) = table.rooms.get_mut(room_id)
        {
            room.phase = RoomPhase::Joined;
        }
    }

    /// Stop tracking a room, discarding its log and pending queue.
    pub fn leave(&self, room_id: &str) {
        if let Ok(mut table) = self.rooms.write() {
            table.rooms.remove(room_id);
        }
    }

    pub fn phase(&self, room_id: &str) -> Option<RoomPhase> {
        self.rooms.read().ok()?.rooms.get(room_id).map(|room| room.phase)
    }

    /// The room's log in arrival order; empty if the room is not tracked.
    pub fn log(&self, room_id: &str) -> Vec<Message> {
        self.rooms
            .read()
            .ok()
            .and_then(|table| table.rooms.get(room_id).map(|room| room.messages.clone()))
            .unwrap_or_default()
    }

    /// Append an optimistic Pending message and arm its deadline. Returns
    /// the wire event to emit.
    pub fn begin_send(
        &self,
        room_id: &str,
        content: &str,
        message_type: MessageType,
        correlation_id: &str,
        now: Instant,
    ) -> Result<ClientEvent, SendRejected> {
        let Ok(mut table) = self.rooms.write() else {
            return Err(SendRejected::NotJoined);
        };
        let room = table.rooms.get_mut(room_id).ok_or(SendRejected::NotJoined)?;

        if room.pending.len() >= self.max_pending {
            return Err(SendRejected::PendingFull);
        }

        room.messages.push(Message {
            id: correlation_id.to_string(),
            author_id: self.viewer_id.to_string(),
            content: content.to_string(),
            message_type,
            created_at: String::new(),
            edited: false,
            delivery: DeliveryState::Pending,
        });
        room.pending.push(PendingSend {
            correlation_id: correlation_id.to_string(),
            content: content.to_string(),
            message_type,
            deadline: now + self.send_timeout,
        });

        Ok(ClientEvent::SendMessage(OutboundMessage {
            room_id: room_id.to_string(),
            content: content.to_string(),
            message_type,
            correlation_id: correlation_id.to_string(),
        }))
    }

    /// Merge one inbound broadcast into the room log.
    ///
    /// A broadcast echoing one of our pending correlation ids replaces the
    /// optimistic entry in place (same position, server record, Confirmed);
    /// anything else appends. First traffic for a Joining room doubles as
    /// the join confirmation for servers that never send the explicit ack.
    pub fn apply_inbound(&self, record: &MessageRecord) -> InboundOutcome {
        let Ok(mut table) = self.rooms.write() else {
            return InboundOutcome::NotJoined;
        };
        let Some(room) = table.rooms.get_mut(&record.room_id) else {
            tracing::debug!(room = %record.room_id, "message for untracked room dropped");
            return InboundOutcome::NotJoined;
        };

        room.phase = RoomPhase::Joined;

        if let Some(correlation) = &record.correlation_id
            && let Some(pos) = room
                .pending
                .iter()
                .position(|pending| &pending.correlation_id == correlation)
        {
            room.pending.remove(pos);
            if let Some(slot) = room
                .messages
                .iter_mut()
                .find(|message| &message.id == correlation)
            {
                *slot = confirmed_message(record);
                return InboundOutcome::ConfirmedPending;
            }
        }

        room.messages.push(confirmed_message(record));
        InboundOutcome::Appended
    }

    /// Mark overdue pending sends Failed. Returns (room, correlation)
    /// pairs for surfacing through the router.
    pub fn expire_pending(&self, now: Instant) -> Vec<(String, String)> {
        let Ok(mut table) = self.rooms.write() else {
            return Vec::new();
        };
        let mut expired = Vec::new();

        for (room_id, room) in &mut table.rooms {
            let mut kept = Vec::with_capacity(room.pending.len());
            for pending in room.pending.drain(..) {
                if pending.deadline > now {
                    kept.push(pending);
                    continue;
                }
                if let Some(message) = room
                    .messages
                    .iter_mut()
                    .find(|message| message.id == pending.correlation_id)
                {
                    message.delivery = DeliveryState::Failed;
                }
                expired.push((room_id.clone(), pending.correlation_id));
            }
            room.pending = kept;
        }

        expired
    }

    /// Wire events for every still-Pending send, deadlines re-armed.
    /// Called after a reconnect, since emits do not queue across a
    /// disconnect.
    pub fn retry_pending(&self, now: Instant) -> Vec<ClientEvent> {
        let Ok(mut table) = self.rooms.write() else {
            return Vec::new();
        };
        let mut events = Vec::new();

        for (room_id, room) in &mut table.rooms {
            for pending in &mut room.pending {
                pending.deadline = now + self.send_timeout;
                events.push(ClientEvent::SendMessage(OutboundMessage {
                    room_id: room_id.clone(),
                    content: pending.content.clone(),
                    message_type: pending.message_type,
                    correlation_id: pending.correlation_id.clone(),
                }));
            }
        }

        events
    }

    /// Re-arm a Failed message for another attempt (user-initiated; failed
    /// sends are never retried automatically).
    pub fn retry_send(
        &self,
        room_id: &str,
        correlation_id: &str,
        now: Instant,
    ) -> Result<ClientEvent, SendRejected> {
        let Ok(mut table) = self.rooms.write() else {
            return Err(SendRejected::NotJoined);
        };
        let room = table.rooms.get_mut(room_id).ok_or(SendRejected::NotJoined)?;

        if room.pending.len() >= self.max_pending {
            return Err(SendRejected::PendingFull);
        }

        let message = room
            .messages
            .iter_mut()
            .find(|message| {
                message.id == correlation_id && message.delivery == DeliveryState::Failed
            })
            .ok_or(SendRejected::NothingToRetry)?;

        message.delivery = DeliveryState::Pending;
        room.pending.push(PendingSend {
            correlation_id: correlation_id.to_string(),
            content: message.content.clone(),
            message_type: message.message_type,
            deadline: now + self.send_timeout,
        });

        Ok(ClientEvent::SendMessage(OutboundMessage {
            room_id: room_id.to_string(),
            content: message.content.clone(),
            message_type: message.message_type,
            correlation_id: correlation_id.to_string(),
        }))
    }
}

fn confirmed_message(record: &MessageRecord) -> Message {
    Message {
        id: record.id.clone(),
        author_id: record.author_id.clone(),
        content: record.content.clone(),
        message_type: record.message_type,
        created_at: record.created_at.clone(),
        edited: record.edited,
        delivery: DeliveryState::Confirmed,
    }
}
