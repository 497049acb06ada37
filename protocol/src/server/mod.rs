mod tests;

use serde_json::Value;

use crate::ParseError;
use crate::types::{CounterUpdate, EntityKind, MessageRecord, MessageType, UpdateType};

/// Events the server pushes to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A chat message broadcast to a room, including the sender's own
    /// messages (recognized by the correlation id echo).
    NewMessage(MessageRecord),

    /// A counter patch from any of the four update channels
    /// (project_update, challenge_update, squad_update,
    /// general_post_update).
    Counter(CounterUpdate),

    /// A user began composing in a room.
    UserTyping { room_id: String, user_id: String },

    /// A user explicitly stopped composing.
    UserStoppedTyping { room_id: String, user_id: String },

    /// Acknowledgment that a join_squad took effect.
    SquadJoined { room_id: String },
}

/// Parse one inbound frame: `{"event": NAME, "data": PAYLOAD}`.
pub fn parse_server_event(frame: &str) -> Result<ServerEvent, ParseError> {
    if frame.trim().is_empty() {
        return Err(ParseError::EmptyFrame);
    }

    let envelope: Value =
        serde_json::from_str(frame).map_err(|e| ParseError::InvalidFormat(e.to_string()))?;

    let name = envelope
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::MissingField("event".to_string()))?;

    let data = envelope.get("data").unwrap_or(&Value::Null);

    match name {
        "new_message" => parse_new_message(data),
        "project_update" => parse_counter_update(EntityKind::Project, data),
        "challenge_update" => parse_counter_update(EntityKind::Challenge, data),
        "squad_update" => parse_counter_update(EntityKind::Squad, data),
        "general_post_update" => parse_counter_update(EntityKind::GeneralPost, data),
        "userTyping" => {
            let (room_id, user_id) = parse_typing(data)?;
            Ok(ServerEvent::UserTyping { room_id, user_id })
        }
        "userStoppedTyping" => {
            let (room_id, user_id) = parse_typing(data)?;
            Ok(ServerEvent::UserStoppedTyping { room_id, user_id })
        }
        "squad_joined" => Ok(ServerEvent::SquadJoined {
            room_id: require_str(data, "roomId")?,
        }),
        other => Err(ParseError::UnknownEvent(other.to_string())),
    }
}

fn parse_new_message(data: &Value) -> Result<ServerEvent, ParseError> {
    let message_type = data
        .get("messageType")
        .and_then(Value::as_str)
        .map(MessageType::from_wire)
        .unwrap_or_default();

    Ok(ServerEvent::NewMessage(MessageRecord {
        id: require_str(data, "id")?,
        room_id: require_str(data, "roomId")?,
        author_id: require_str(data, "authorId")?,
        content: require_str(data, "content")?,
        message_type,
        created_at: str_any(data, &["createdAt", "timestamp"]).unwrap_or_default(),
        edited: data.get("edited").and_then(Value::as_bool).unwrap_or(false),
        correlation_id: str_any(data, &["correlationId"]),
    }))
}

// The four producers never agreed on a payload shape, so the id, count
// and actor fields are accepted under every name seen on the wire.
fn parse_counter_update(kind: EntityKind, data: &Value) -> Result<ServerEvent, ParseError> {
    let raw_type = require_str(data, "type")?;
    let update_type = UpdateType::from_wire(&raw_type)
        .ok_or_else(|| ParseError::InvalidFormat(format!("unrecognized update type: {raw_type}")))?;

    let entity_id = str_any(
        data,
        &["projectId", "challengeId", "squadId", "postId", "entityId"],
    )
    .ok_or_else(|| ParseError::MissingField("entityId".to_string()))?;

    let count = i64_any(data, &[update_type.counter_name(), "count"])
        .ok_or_else(|| ParseError::MissingField(update_type.counter_name().to_string()))?;

    let actor_id = str_any(data, &["likedBy", "repostedBy", "votedBy", "actorId", "userId"])
        .ok_or_else(|| ParseError::MissingField("actorId".to_string()))?;

    let actor_state = update_type
        .viewer_flag_name()
        .and_then(|flag| data.get(flag).and_then(Value::as_bool));

    Ok(ServerEvent::Counter(CounterUpdate {
        entity_kind: kind,
        update_type,
        entity_id,
        count,
        actor_id,
        actor_state,
        seq: data.get("seq").and_then(Value::as_u64),
    }))
}

fn parse_typing(data: &Value) -> Result<(String, String), ParseError> {
    Ok((require_str(data, "roomId")?, require_str(data, "userId")?))
}

fn require_str(data: &Value, field: &str) -> Result<String, ParseError> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingField(field.to_string()))
}

fn str_any(data: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| data.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn i64_any(data: &Value, fields: &[&str]) -> Option<i64> {
    fields
        .iter()
        .find_map(|field| data.get(*field).and_then(Value::as_i64))
}
