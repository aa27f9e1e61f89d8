// Authoritative session state owned by the GM.
//
// `SessionState` is the data structure `gm.rs` drives: the join queue, the
// lobby, the current game and the session phase. All mutation happens
// through methods called from the GM event loop, so there is no internal
// locking. Methods here only change state and report what happened; sending
// messages about it is the controller's job.
//
// Invariants kept by every method:
// - A participant is in at most one of {queue, lobby}, keyed by endpoint.
// - `queue.len() + lobby.len()` never exceeds `capacity` (the ruleset's
//   required player count), so the lobby can never overfill either.
// - Lobby members hold pairwise distinct symbols.
// - Phase only moves forward: Idle -> LobbyOpen -> InProgress -> Finished.
//
// Observers get a cloned `SessionSnapshot`, never a reference into here.

use std::fmt;

use peerplay_protocol::{
    EndpointId, GameState, GameStatus, Outcome, Participant, ParticipantId, SessionCode, Symbol,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// GM-side lifecycle of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    Idle,
    LobbyOpen,
    InProgress,
    Finished,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::LobbyOpen => "lobby open",
            SessionPhase::InProgress => "in progress",
            SessionPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// What became of an incoming join request.
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// Added to the queue, waiting for the host's decision.
    Queued(Participant),
    /// This endpoint is already queued or seated; nothing changed.
    Duplicate,
    /// Refused; the reason goes back to the requester.
    Refused(&'static str),
}

/// What became of a peer that disconnected.
#[derive(Clone, Debug, PartialEq)]
pub enum Departure {
    /// The endpoint was not a participant.
    Unknown,
    /// Left the queue or lobby before the game started.
    PreGame(Participant),
    /// Left a running (or finished) game. `forfeit` is set when the loss
    /// ended the game in favour of the lone survivor.
    Active {
        participant: Participant,
        forfeit: Option<Outcome>,
    },
}

/// Point-in-time copy of the session for observers.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot<B> {
    pub session_code: SessionCode,
    pub phase: SessionPhase,
    pub queue: Vec<Participant>,
    pub lobby: Vec<Participant>,
    pub game: Option<GameState<B>>,
}

pub const REASON_NOT_OPEN: &str = "session is not accepting players";
pub const REASON_STARTED: &str = "game already started";
pub const REASON_FULL: &str = "lobby is full";

pub struct SessionState<B> {
    session_code: SessionCode,
    phase: SessionPhase,
    capacity: usize,
    queue: Vec<Participant>,
    lobby: Vec<Participant>,
    game: Option<GameState<B>>,
    next_participant_id: u32,
}

impl<B: Clone> SessionState<B> {
    pub fn new(session_code: SessionCode, capacity: usize) -> Self {
        Self {
            session_code,
            phase: SessionPhase::Idle,
            capacity,
            queue: Vec::new(),
            lobby: Vec::new(),
            game: None,
            next_participant_id: 1,
        }
    }

    pub fn session_code(&self) -> &SessionCode {
        &self.session_code
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn queue(&self) -> &[Participant] {
        &self.queue
    }

    pub fn lobby(&self) -> &[Participant] {
        &self.lobby
    }

    pub fn game(&self) -> Option<&GameState<B>> {
        self.game.as_ref()
    }

    pub fn occupancy(&self) -> usize {
        self.queue.len() + self.lobby.len()
    }

    pub fn is_admitted(&self, endpoint: &EndpointId) -> bool {
        self.queue
            .iter()
            .chain(&self.lobby)
            .any(|p| &p.endpoint == endpoint)
    }

    /// Idle -> LobbyOpen. Called once the GM identity is live.
    pub fn open_lobby(&mut self) -> Result<()> {
        self.require(SessionPhase::Idle, "open the lobby")?;
        self.phase = SessionPhase::LobbyOpen;
        Ok(())
    }

    /// Queue a join request, or say why not.
    pub fn admit(&mut self, tag: &str, endpoint: EndpointId) -> Admission {
        match self.phase {
            SessionPhase::Idle => return Admission::Refused(REASON_NOT_OPEN),
            SessionPhase::InProgress | SessionPhase::Finished => {
                return Admission::Refused(REASON_STARTED);
            }
            SessionPhase::LobbyOpen => {}
        }
        if self.is_admitted(&endpoint) {
            return Admission::Duplicate;
        }
        if self.occupancy() >= self.capacity {
            return Admission::Refused(REASON_FULL);
        }

        let id = ParticipantId(self.next_participant_id);
        self.next_participant_id += 1;
        let participant = Participant {
            id,
            endpoint,
            tag: tag.trim().to_string(),
            symbol: Symbol::FIRST,
            connected: true,
        };
        self.queue.push(participant.clone());
        Admission::Queued(participant)
    }

    /// Move a queued participant into the lobby, assigning the first seat
    /// symbol not already held there.
    pub fn promote(&mut self, endpoint: &EndpointId) -> Result<Participant> {
        self.require(SessionPhase::LobbyOpen, "accept a player")?;
        let index = self
            .queue
            .iter()
            .position(|p| &p.endpoint == endpoint)
            .ok_or_else(|| SessionError::NotQueued(endpoint.clone()))?;
        if self.lobby.len() >= self.capacity {
            return Err(SessionError::LobbyFull);
        }
        let symbol = Symbol::SEATS
            .into_iter()
            .find(|s| self.lobby.iter().all(|p| p.symbol != *s))
            .ok_or(SessionError::LobbyFull)?;

        let mut participant = self.queue.remove(index);
        participant.symbol = symbol;
        self.lobby.push(participant.clone());
        Ok(participant)
    }

    /// Drop a queued participant (host rejected it).
    pub fn remove_queued(&mut self, endpoint: &EndpointId) -> Result<Participant> {
        let index = self
            .queue
            .iter()
            .position(|p| &p.endpoint == endpoint)
            .ok_or_else(|| SessionError::NotQueued(endpoint.clone()))?;
        Ok(self.queue.remove(index))
    }

    /// The lobby roster if a game can start now.
    pub fn ready_to_start(&self) -> Result<Vec<Participant>> {
        self.require(SessionPhase::LobbyOpen, "start the game")?;
        if self.lobby.len() != self.capacity {
            return Err(SessionError::LobbyNotFull {
                required: self.capacity,
                present: self.lobby.len(),
            });
        }
        Ok(self.lobby.clone())
    }

    /// LobbyOpen -> InProgress with the ruleset's opening state.
    pub fn begin(&mut self, game: GameState<B>) {
        self.phase = SessionPhase::InProgress;
        self.game = Some(game);
    }

    /// Replace the authoritative game state after an accepted move.
    pub fn apply(&mut self, next: GameState<B>) {
        self.game = Some(next);
    }

    /// End the running game: the session moves to Finished and the stored
    /// game is stamped finished with no turn holder. `None` keeps whatever
    /// outcome the game already records. Returns the final game.
    pub fn finish(&mut self, outcome: Option<Outcome>) -> Option<&GameState<B>> {
        self.phase = SessionPhase::Finished;
        let game = self.game.as_mut()?;
        game.status = GameStatus::Finished;
        game.turn = None;
        if outcome.is_some() {
            game.outcome = outcome;
        }
        Some(game)
    }

    /// Remove whatever `endpoint` was to this session.
    pub fn depart(&mut self, endpoint: &EndpointId) -> Departure {
        let seated = self.game.as_mut().and_then(|game| {
            let index = game.participants.iter().position(|p| &p.endpoint == endpoint)?;
            Some(game.participants.remove(index))
        });
        if let Some(participant) = seated {
            self.lobby.retain(|p| &p.endpoint != endpoint);
            let forfeit = self.forfeit_to_survivor();
            return Departure::Active {
                participant,
                forfeit,
            };
        }

        if let Some(index) = self.queue.iter().position(|p| &p.endpoint == endpoint) {
            return Departure::PreGame(self.queue.remove(index));
        }
        if let Some(index) = self.lobby.iter().position(|p| &p.endpoint == endpoint) {
            return Departure::PreGame(self.lobby.remove(index));
        }
        Departure::Unknown
    }

    /// A running game with one participant left is won by that participant.
    fn forfeit_to_survivor(&mut self) -> Option<Outcome> {
        if self.phase != SessionPhase::InProgress {
            return None;
        }
        let [survivor] = self.game.as_ref()?.participants.as_slice() else {
            return None;
        };
        let outcome = Outcome::Winner(survivor.symbol);
        self.finish(Some(outcome));
        Some(outcome)
    }

    pub fn snapshot(&self) -> SessionSnapshot<B> {
        SessionSnapshot {
            session_code: self.session_code.clone(),
            phase: self.phase,
            queue: self.queue.clone(),
            lobby: self.lobby.clone(),
            game: self.game.clone(),
        }
    }

    fn require(&self, phase: SessionPhase, action: &'static str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::WrongPhase {
                action,
                phase: self.phase,
            })
        }
    }
}
