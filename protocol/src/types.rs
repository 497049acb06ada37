use serde::{Deserialize, Serialize};

/// Content kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    System,
}

impl MessageType {
    pub(crate) fn from_wire(value: &str) -> Self {
        match value {
            "image" => Self::Image,
            "system" => Self::System,
            _ => Self::Text,
        }
    }
}

/// A chat message as broadcast by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub content: String,
    pub message_type: MessageType,
    /// Server timestamp, kept opaque; the log is ordered by arrival.
    pub created_at: String,
    pub edited: bool,
    /// Echo of the client-generated correlation id, present only on the
    /// sender's own broadcast.
    pub correlation_id: Option<String>,
}

/// Which inbound update event carried a counter patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Challenge,
    Squad,
    GeneralPost,
}

/// The kind of social-counter change a patch describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    LikeUpdate,
    RepostUpdate,
    NewComment,
    HelpfulVote,
}

impl UpdateType {
    pub(crate) fn from_wire(value: &str) -> Option<Self> {
        match value {
            "LIKE_UPDATE" => Some(Self::LikeUpdate),
            "REPOST_UPDATE" => Some(Self::RepostUpdate),
            "NEW_COMMENT" => Some(Self::NewComment),
            "HELPFUL_VOTE" => Some(Self::HelpfulVote),
            _ => None,
        }
    }

    /// Wire name of the counter this update rewrites.
    pub fn counter_name(self) -> &'static str {
        match self {
            Self::LikeUpdate => "likeCount",
            Self::RepostUpdate => "repostCount",
            Self::NewComment => "commentCount",
            Self::HelpfulVote => "helpfulCount",
        }
    }

    /// Wire name of the viewer-specific flag, where the update carries one.
    /// Comment counts have no per-viewer state.
    pub fn viewer_flag_name(self) -> Option<&'static str> {
        match self {
            Self::LikeUpdate => Some("liked"),
            Self::RepostUpdate => Some("reposted"),
            Self::NewComment => None,
            Self::HelpfulVote => Some("helpful"),
        }
    }
}

/// A server-authoritative counter patch for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterUpdate {
    pub entity_kind: EntityKind,
    pub update_type: UpdateType,
    pub entity_id: String,
    pub count: i64,
    /// The user whose action produced this patch.
    pub actor_id: String,
    /// The actor's resulting flag state (`liked: true` after a like),
    /// absent for updates with no per-viewer state.
    pub actor_state: Option<bool>,
    /// Optional per-entity monotonic sequence number. Not all producers
    /// send one; patches without it merge last-arrival-wins.
    pub seq: Option<u64>,
}
