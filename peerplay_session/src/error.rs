//! Error types for the session core.
//!
//! Protocol-level refusals (full lobby, out-of-turn move, occupied cell) are
//! *not* errors here: they travel to the requester as `join-rejected` or
//! `move-result` messages. These types cover host-side commands and
//! transport plumbing.

use std::time::Duration;

use peerplay_protocol::{CodecError, EndpointId, IdentityError};
use thiserror::Error;

use crate::state::SessionPhase;

/// Result type alias using [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures raised by a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another peer already holds this identity in the directory.
    #[error("endpoint {0} is already registered")]
    IdentityTaken(EndpointId),

    /// The directory has no live peer under this identity.
    #[error("peer {0} is not reachable")]
    PeerUnavailable(EndpointId),

    /// Connection attempt did not complete in time.
    #[error("connecting to {remote} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Peer being dialled.
        remote: EndpointId,
        /// Configured limit.
        timeout: Duration,
    },

    /// The transport has been shut down.
    #[error("transport is shut down")]
    Shutdown,

    /// Socket-level failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by a ruleset outside of move validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesetError {
    /// `initial_state` needs exactly the ruleset's player count.
    #[error("{ruleset} requires exactly {required} players, got {actual}")]
    WrongPlayerCount {
        /// Ruleset name.
        ruleset: String,
        /// Required count.
        required: usize,
        /// Supplied count.
        actual: usize,
    },
}

/// Top-level error for host commands and controller setup.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command is not valid in the current phase.
    #[error("cannot {action} while session is {phase:?}")]
    WrongPhase {
        /// Attempted command.
        action: &'static str,
        /// Phase at the time of the attempt.
        phase: SessionPhase,
    },

    /// `start` was called before the lobby filled up.
    #[error("need {required} players to start, have {present}")]
    LobbyNotFull {
        /// Players required by the ruleset.
        required: usize,
        /// Players currently in the lobby.
        present: usize,
    },

    /// The lobby has no free seat.
    #[error("lobby is full")]
    LobbyFull,

    /// Accept/reject named an endpoint that is not waiting in the queue.
    #[error("{0} is not in the join queue")]
    NotQueued(EndpointId),

    /// Bad session code, tag or endpoint identity.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Transport failure during setup or connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Ruleset refused to build a game.
    #[error(transparent)]
    Ruleset(#[from] RulesetError),

    /// Message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The GM event loop stopped or did not answer in time.
    #[error("GM event loop is not responding")]
    EventLoopGone,
}
