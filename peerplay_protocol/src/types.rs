// Core data types shared by the GM and player sides of a session.
//
// These are the records that travel inside protocol messages (`message.rs`)
// and that the GM's session state (`peerplay_session::state`) is built from.
// `GameState` is generic over the board representation so that the session
// machinery never depends on a particular game; the ruleset picks the board
// type (see `peerplay_session::ruleset::Ruleset::Board`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{EndpointId, SessionCode};

/// GM-assigned participant id (compact u32, unique within one session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Seat marker held by a participant. `X` always moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    /// The symbol that opens every game.
    pub const FIRST: Symbol = Symbol::X;

    /// Seat order used when promoting participants into the lobby.
    pub const SEATS: [Symbol; 2] = [Symbol::X, Symbol::O];

    pub fn other(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => f.write_str("X"),
            Symbol::O => f.write_str("O"),
        }
    }
}

/// Result of a finished game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Winner(Symbol),
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Winner(symbol) => write!(f, "{symbol} wins"),
            Outcome::Draw => f.write_str("draw"),
        }
    }
}

/// Lifecycle of a single game as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
}

/// One admitted player, as the GM records it and as players see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub endpoint: EndpointId,
    /// Display tag as the player typed it (trimmed, not sanitized).
    pub tag: String,
    /// Placeholder `Symbol::FIRST` while queued; fixed on promotion.
    pub symbol: Symbol,
    pub connected: bool,
}

/// Full game record. The GM owns the authoritative copy; players only ever
/// replace their mirror with a copy pushed by the GM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState<B> {
    pub board: B,
    /// Symbol whose move it is. `None` once the game is over.
    pub turn: Option<Symbol>,
    /// Active participants in seat order.
    pub participants: Vec<Participant>,
    pub outcome: Option<Outcome>,
    pub status: GameStatus,
    pub session_code: SessionCode,
}

impl<B> GameState<B> {
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// The active participant holding the turn marker, if any.
    pub fn turn_holder(&self) -> Option<&Participant> {
        let turn = self.turn?;
        self.participants.iter().find(|p| p.symbol == turn)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == GameStatus::Playing
    }
}
