use serde::Serialize;
use serde_json::json;

use crate::types::MessageType;

/// Payload of a `send_message` event.
///
/// The correlation id is generated by the client and echoed back in the
/// server's `new_message` broadcast, which is how the sender recognizes
/// its own message instead of appending a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub room_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub correlation_id: String,
}

/// Events the client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// join_squad ROOMID
    JoinSquad(String),

    /// leave_squad ROOMID
    LeaveSquad(String),

    /// send_message {roomId, content, messageType, correlationId}
    SendMessage(OutboundMessage),

    /// typing_start ROOMID
    TypingStart(String),

    /// typing_stop ROOMID
    TypingStop(String),

    /// subscribe_project PROJECTID
    SubscribeProject(String),

    /// unsubscribe_project PROJECTID
    UnsubscribeProject(String),

    /// subscribe_challenge CHALLENGEID
    SubscribeChallenge(String),

    /// unsubscribe_challenge CHALLENGEID
    UnsubscribeChallenge(String),
}

impl ClientEvent {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinSquad(_) => "join_squad",
            Self::LeaveSquad(_) => "leave_squad",
            Self::SendMessage(_) => "send_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::SubscribeProject(_) => "subscribe_project",
            Self::UnsubscribeProject(_) => "unsubscribe_project",
            Self::SubscribeChallenge(_) => "subscribe_challenge",
            Self::UnsubscribeChallenge(_) => "unsubscribe_challenge",
        }
    }

    /// Serialize to the wire envelope: `{"event": NAME, "data": PAYLOAD}`.
    pub fn to_wire(&self) -> String {
        let data = match self {
            Self::JoinSquad(id)
            | Self::LeaveSquad(id)
            | Self::TypingStart(id)
            | Self::TypingStop(id)
            | Self::SubscribeProject(id)
            | Self::UnsubscribeProject(id)
            | Self::SubscribeChallenge(id)
            | Self::UnsubscribeChallenge(id) => json!(id),
            Self::SendMessage(message) => json!(message),
        };

        json!({ "event": self.name(), "data": data }).to_string()
    }
}
