// Tic-tac-toe ruleset.
//
// Board: nine cells in row-major order, each empty or holding a symbol.
// Action payload: `{"position": <0..=8>}`. X opens; turns alternate.
//
// Terminal detection checks the eight lines before checking fullness, so a
// move that completes a line on the last empty cell is a win, never a draw.

use peerplay_protocol::{
    GameState, GameStatus, Outcome, Participant, ParticipantId, SessionCode, Symbol,
};

use crate::error::RulesetError;
use crate::ruleset::{Ruleset, Verdict, check_turn};

pub const CELLS: usize = 9;

pub type Cell = Option<Symbol>;
pub type Board = [Cell; CELLS];

/// Rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Clone, Copy, Debug, Default)]
pub struct TicTacToe;

impl TicTacToe {
    /// Action payload placing the mover's symbol on `position`.
    pub fn place(position: usize) -> serde_json::Value {
        serde_json::json!({ "position": position })
    }
}

/// Winner if any line is complete, else draw if the board is full, else
/// `None` (still in progress).
pub fn board_outcome(board: &Board) -> Option<Outcome> {
    for [a, b, c] in LINES {
        if board[a].is_some() && board[a] == board[b] && board[b] == board[c] {
            return board[a].map(Outcome::Winner);
        }
    }
    if board.iter().all(Option::is_some) {
        return Some(Outcome::Draw);
    }
    None
}

/// Three rows of `X`, `O` or `.` for terminal display.
pub fn render(board: &Board) -> String {
    board
        .chunks(3)
        .map(|row| {
            row.iter()
                .map(|cell| cell.map_or_else(|| ".".to_string(), |s| s.to_string()))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Ruleset for TicTacToe {
    type Board = Board;

    fn name(&self) -> &str {
        "Tic-Tac-Toe"
    }

    fn required_players(&self) -> usize {
        2
    }

    fn initial_state(
        &self,
        mut participants: Vec<Participant>,
        session_code: &SessionCode,
    ) -> Result<GameState<Board>, RulesetError> {
        if participants.len() != self.required_players() {
            return Err(RulesetError::WrongPlayerCount {
                ruleset: self.name().into(),
                required: self.required_players(),
                actual: participants.len(),
            });
        }
        participants.sort_by_key(|p| p.symbol);
        Ok(GameState {
            board: [None; CELLS],
            turn: Some(Symbol::FIRST),
            participants,
            outcome: None,
            status: GameStatus::Playing,
            session_code: session_code.clone(),
        })
    }

    fn validate_action(
        &self,
        state: &GameState<Board>,
        actor: ParticipantId,
        action: &serde_json::Value,
    ) -> Verdict<Board> {
        let symbol = match check_turn(state, actor) {
            Ok(mover) => mover.symbol,
            Err(reason) => return Verdict::rejected(reason),
        };

        let Some(position) = action.get("position").and_then(serde_json::Value::as_i64) else {
            return Verdict::rejected(r#"invalid move format: expected {"position": 0-8}"#);
        };
        let Some(index) = usize::try_from(position).ok().filter(|i| *i < CELLS) else {
            return Verdict::rejected("position must be between 0 and 8");
        };
        if state.board[index].is_some() {
            return Verdict::rejected("cell is already occupied");
        }

        let mut next = state.clone();
        next.board[index] = Some(symbol);
        let outcome = board_outcome(&next.board);
        next.outcome = outcome;
        if outcome.is_some() {
            next.turn = None;
            next.status = GameStatus::Finished;
        } else {
            next.turn = Some(symbol.other());
        }
        Verdict::Accepted { next, outcome }
    }
}
