// The pluggable game-rules contract.
//
// A `Ruleset` decides what a legal action is and what state it produces.
// The GM controller (`gm.rs`) treats it as a black box: it never looks
// inside the board, it only asks for an initial state, hands every move
// command to `validate_action`, and reacts to the verdict. Tic-tac-toe
// (`tictactoe.rs`) is one implementation.
//
// `validate_action` takes the state by shared reference and returns a fresh
// state on success, so a rejected or accepted move can never disturb the
// GM's authoritative copy. The board representation is the associated type
// `Board`, which flows into `GameState<Board>` and every state-bearing
// protocol message.

use std::fmt;

use peerplay_protocol::{GameState, GameStatus, Outcome, Participant, ParticipantId, SessionCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RulesetError;

/// Result of validating one action.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict<B> {
    /// The action is refused; `reason` is shown to the mover.
    Rejected { reason: String },
    /// The action is legal. `outcome` is set when it ends the game.
    Accepted {
        next: GameState<B>,
        outcome: Option<Outcome>,
    },
}

impl<B> Verdict<B> {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Verdict::Rejected {
            reason: reason.into(),
        }
    }
}

/// Game rules consulted by the GM.
pub trait Ruleset: Send + 'static {
    type Board: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + 'static;

    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Exact number of participants a game needs. Also the lobby capacity.
    fn required_players(&self) -> usize;

    /// Build the opening state. Fails unless exactly
    /// [`required_players`](Ruleset::required_players) are supplied.
    fn initial_state(
        &self,
        participants: Vec<Participant>,
        session_code: &SessionCode,
    ) -> Result<GameState<Self::Board>, RulesetError>;

    /// Judge `action` by `actor` against `state`. Pure: no side effects.
    fn validate_action(
        &self,
        state: &GameState<Self::Board>,
        actor: ParticipantId,
        action: &serde_json::Value,
    ) -> Verdict<Self::Board>;

    fn is_terminal(&self, state: &GameState<Self::Board>) -> bool {
        state.status == GameStatus::Finished
    }

    fn outcome(&self, state: &GameState<Self::Board>) -> Option<Outcome> {
        state.outcome
    }
}

/// Checks shared by every turn-based ruleset: the game is running, the actor
/// is seated, and the actor holds the turn marker. Returns the actor's
/// participant record.
pub fn check_turn<B>(state: &GameState<B>, actor: ParticipantId) -> Result<&Participant, String> {
    if !state.is_in_progress() {
        return Err("game is not in progress".into());
    }
    let participant = state
        .participant(actor)
        .ok_or_else(|| String::from("participant not found in game"))?;
    match state.turn {
        Some(turn) if turn == participant.symbol => Ok(participant),
        Some(turn) => Err(format!("it's not your turn (current turn: {turn})")),
        None => Err("it's not your turn".into()),
    }
}

#[cfg(test)]
mod tests {
    use peerplay_protocol::{EndpointId, Symbol};

    use super::*;

    fn state(turn: Option<Symbol>, status: GameStatus) -> GameState<()> {
        let code = SessionCode::new("ABCDEF").unwrap();
        let seat = |id, tag: &str, symbol| Participant {
            id: ParticipantId(id),
            endpoint: EndpointId::player(&code, tag).unwrap(),
            tag: tag.into(),
            symbol,
            connected: true,
        };
        GameState {
            board: (),
            turn,
            participants: vec![seat(1, "alice", Symbol::X), seat(2, "bob", Symbol::O)],
            outcome: None,
            status,
            session_code: code.clone(),
        }
    }

    #[test]
    fn turn_holder_passes() {
        let s = state(Some(Symbol::X), GameStatus::Playing);
        assert_eq!(check_turn(&s, ParticipantId(1)).unwrap().tag, "alice");
    }

    #[test]
    fn out_of_turn_rejected() {
        let s = state(Some(Symbol::X), GameStatus::Playing);
        let reason = check_turn(&s, ParticipantId(2)).unwrap_err();
        assert!(reason.contains("not your turn"), "{reason}");
    }

    #[test]
    fn unknown_actor_rejected() {
        let s = state(Some(Symbol::X), GameStatus::Playing);
        assert_eq!(
            check_turn(&s, ParticipantId(99)).unwrap_err(),
            "participant not found in game"
        );
    }

    #[test]
    fn finished_game_rejected_before_anything_else() {
        let s = state(None, GameStatus::Finished);
        assert_eq!(
            check_turn(&s, ParticipantId(99)).unwrap_err(),
            "game is not in progress"
        );
    }
}
