//! Peer wire protocol.
//!
//! Each message is one line of JSON: `{"type": "MOVE" | "SYNC" | "RESET",
//! "state": <GameState>}`. Every kind carries a full snapshot; for `RESET` the
//! snapshot is informational and receivers build their own initial state.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::GameState;

/// Kind tag of a [`WireMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MessageKind {
    #[display("MOVE")]
    Move,
    #[display("SYNC")]
    Sync,
    #[display("RESET")]
    Reset,
}

impl MessageKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "MOVE" => Some(Self::Move),
            "SYNC" => Some(Self::Sync),
            "RESET" => Some(Self::Reset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WireMessage {
    /// Sender's state after a locally validated move.
    Move { state: GameState },
    /// Sender's current state, sent once when a peer connects.
    Sync { state: GameState },
    /// Start over. The payload is ignored by receivers.
    Reset { state: GameState },
}

impl WireMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::Move { .. } => MessageKind::Move,
            WireMessage::Sync { .. } => MessageKind::Sync,
            WireMessage::Reset { .. } => MessageKind::Reset,
        }
    }

    pub fn state(&self) -> &GameState {
        match self {
            WireMessage::Move { state }
            | WireMessage::Sync { state }
            | WireMessage::Reset { state } => state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ProtocolError {
    #[display("malformed message: {message}")]
    Malformed { message: String },
    #[display("message has no type")]
    MissingKind,
    #[display("unknown message type {kind:?}")]
    UnknownKind { kind: String },
    #[display("bad {kind} payload: {message}")]
    BadPayload { kind: MessageKind, message: String },
}

/// Serialize a message as a single line (without the trailing newline).
pub fn encode(message: &WireMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Malformed {
        message: e.to_string(),
    })
}

/// Parse one line into a message.
///
/// The kind tag is checked before the payload is interpreted, so a frame
/// from a newer or foreign peer is reported by kind rather than as a
/// generic shape error. A `RESET` whose payload does not parse still
/// decodes, carrying a fresh initial state.
pub fn decode(line: &str) -> Result<WireMessage, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim()).map_err(|e| ProtocolError::Malformed {
        message: e.to_string(),
    })?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?;
    let kind = MessageKind::from_tag(tag).ok_or_else(|| ProtocolError::UnknownKind {
        kind: tag.to_string(),
    })?;

    if kind == MessageKind::Reset {
        let state = value
            .get("state")
            .and_then(|state| GameState::deserialize(state).ok())
            .unwrap_or_default();
        return Ok(WireMessage::Reset { state });
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::BadPayload {
        kind,
        message: e.to_string(),
    })
}
