// Protocol messages exchanged between the GM and its players.
//
// A single `Message` enum covers both directions. Players only ever send
// `JoinRequest` and `MoveCommand`; everything else is GM-originated. On the
// wire every message is wrapped in an `Envelope` that adds a creation
// timestamp, and serialized as one flat JSON object:
//
//   {"type":"move-command","timestamp":1712345678901,"participant_id":3,"action":{"position":4}}
//
// The timestamp is informational only; ordering comes from the transport.
//
// Messages are generic over the board type `B` so that state-bearing
// messages carry the ruleset's own board representation. Action payloads
// stay opaque (`serde_json::Value`) here; only the ruleset interprets them.
//
// Decoding distinguishes unknown message types (`CodecError::UnknownType`,
// which receivers ignore) from structurally broken input
// (`CodecError::Decode`).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::EndpointId;
use crate::types::{GameState, Outcome, Participant, ParticipantId};

/// Every `type` value this protocol version understands.
pub const MESSAGE_TYPES: [&str; 11] = [
    "join-request",
    "join-accepted",
    "join-rejected",
    "player-disconnected",
    "move-command",
    "move-result",
    "state-update",
    "your-turn",
    "game-started",
    "game-over",
    "lobby-update",
];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

/// Protocol vocabulary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message<B> {
    /// Player asks to be admitted to the session.
    JoinRequest { tag: String, endpoint: EndpointId },
    /// GM promoted the player into the lobby.
    JoinAccepted {
        participant: Participant,
        in_lobby: bool,
    },
    /// GM refused (or revoked) a join request.
    JoinRejected { reason: String },
    /// An active participant dropped out of the game.
    PlayerDisconnected {
        participant_id: ParticipantId,
        tag: String,
    },
    /// Player proposes an action; the payload is ruleset-defined.
    MoveCommand {
        participant_id: ParticipantId,
        action: serde_json::Value,
    },
    /// GM's verdict on the sender's last move command.
    MoveResult {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Full authoritative state after an accepted move.
    StateUpdate { state: GameState<B> },
    /// Sent only to the participant now holding the turn marker.
    YourTurn { state: GameState<B> },
    /// Game began; carries the initial state.
    GameStarted { state: GameState<B> },
    /// Game ended; carries the final state and result.
    GameOver {
        state: GameState<B>,
        outcome: Option<Outcome>,
    },
    /// Full queue and lobby snapshot, in GM order.
    LobbyUpdate {
        lobby: Vec<Participant>,
        queue: Vec<Participant>,
    },
}

impl<B> Message<B> {
    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::JoinRequest { .. } => "join-request",
            Message::JoinAccepted { .. } => "join-accepted",
            Message::JoinRejected { .. } => "join-rejected",
            Message::PlayerDisconnected { .. } => "player-disconnected",
            Message::MoveCommand { .. } => "move-command",
            Message::MoveResult { .. } => "move-result",
            Message::StateUpdate { .. } => "state-update",
            Message::YourTurn { .. } => "your-turn",
            Message::GameStarted { .. } => "game-started",
            Message::GameOver { .. } => "game-over",
            Message::LobbyUpdate { .. } => "lobby-update",
        }
    }

    pub fn move_ok() -> Self {
        Message::MoveResult {
            ok: true,
            error: None,
        }
    }

    pub fn move_failed(reason: impl Into<String>) -> Self {
        Message::MoveResult {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// A message stamped with its creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<B> {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(flatten)]
    pub message: Message<B>,
}

impl<B> Envelope<B> {
    /// Stamp `message` with the current wall-clock time.
    pub fn new(message: Message<B>) -> Self {
        Self {
            timestamp: now_millis(),
            message,
        }
    }
}

/// Stamp and serialize a message for the wire.
pub fn encode<B: Serialize>(message: Message<B>) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&Envelope::new(message)).map_err(CodecError::Encode)
}

/// Deserialize a wire message. Unknown `type` values yield
/// `CodecError::UnknownType` so callers can skip them quietly.
pub fn decode<B: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<B>, CodecError> {
    #[derive(Deserialize)]
    struct TypeTag {
        #[serde(rename = "type")]
        kind: String,
    }

    let tag: TypeTag = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
    if !MESSAGE_TYPES.contains(&tag.kind.as_str()) {
        return Err(CodecError::UnknownType(tag.kind));
    }
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
