use thiserror::Error;

pub mod client;
pub mod server;
pub mod types;

pub use client::{ClientEvent, OutboundMessage};
pub use server::{ServerEvent, parse_server_event};
pub use types::{CounterUpdate, EntityKind, MessageRecord, MessageType, UpdateType};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid event format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Empty frame")]
    EmptyFrame,
}
