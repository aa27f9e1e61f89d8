// peerplay_session: host-authoritative game sessions over peer links.
//
// One peer, the Game Master (GM), owns the authoritative session: join
// queue, lobby, game state. Players connect to the GM's deterministic
// endpoint identity, ask to join, and from then on only propose moves and
// mirror what the GM pushes. Game rules are pluggable through `Ruleset`.
//
// Module overview:
// - `error.rs`:      Typed errors for host commands and transports.
// - `config.rs`:     `SessionConfig` timeout policy.
// - `ruleset.rs`:    The `Ruleset` trait, `Verdict`, shared turn checks.
// - `tictactoe.rs`:  Tic-tac-toe ruleset.
// - `state.rs`:      GM-side `SessionState`: phase machine, queue, lobby,
//                    game. Pure data, no I/O.
// - `transport/`:    `Transport`/`Network` seam plus memory and TCP
//                    implementations.
// - `gm.rs`:         `GmController`: applies inbound messages and host
//                    commands to the session state and sends the results.
// - `server.rs`:     Runs a `GmController` on its own thread behind a single
//                    input channel (`start_gm`, `GmHandle`).
// - `player.rs`:     `PlayerController` and the `PlayerView` mirror.
//
// Dependencies: `peerplay_protocol` for identities, messages and framing.
// No async runtime: everything is `std` threads and `mpsc` channels.
//
// The `peerplay` binary (`main.rs`) hosts or joins a tic-tac-toe session
// over TCP from the terminal.

pub mod config;
pub mod error;
pub mod gm;
pub mod player;
pub mod ruleset;
pub mod server;
pub mod state;
pub mod tictactoe;
pub mod transport;

pub use config::SessionConfig;
pub use error::{Result, RulesetError, SessionError, TransportError};
pub use gm::{GmController, GmEvent};
pub use player::{MoveStatus, PlayerController, PlayerView, Screen};
pub use ruleset::{Ruleset, Verdict};
pub use server::{GmHandle, start_gm};
pub use state::{SessionPhase, SessionSnapshot};
pub use tictactoe::TicTacToe;
