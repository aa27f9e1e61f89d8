// Test-only harness for multiplayer integration tests.
//
// `TestSession` runs a real GM event loop (`start_gm`) on an in-process
// `MemoryNetwork`, and `TestPlayer` wraps a real `PlayerController` joined
// to it. The path under test is the production one end to end:
// player → memory link → GM thread → ruleset → broadcast → player view.
//
// The only test-specific code is the blocking wait helpers, which loop on
// `poll_timeout` until a condition holds or `WAIT` runs out, and the message
// log each `TestPlayer` keeps so tests can check ordering.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use peerplay_protocol::{EndpointId, Message, SessionCode};
use peerplay_session::gm::GmEvent;
use peerplay_session::server::GmHandle;
use peerplay_session::tictactoe::{Board, TicTacToe};
use peerplay_session::transport::memory::{MemoryNetwork, MemoryTransport};
use peerplay_session::{MoveStatus, PlayerController, PlayerView, Screen, SessionConfig, start_gm};

/// Upper bound on any single blocking wait.
pub const WAIT: Duration = Duration::from_secs(5);

/// Granularity of one poll inside a wait loop.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// A GM running on its own thread, plus the network players join through.
pub struct TestSession {
    pub network: MemoryNetwork,
    pub code: SessionCode,
    pub gm: GmHandle<Board>,
    pub events: Receiver<GmEvent<Board>>,
    config: SessionConfig,
}

impl TestSession {
    /// Host a tic-tac-toe session under `code`.
    pub fn host(code: &str) -> Self {
        let network = MemoryNetwork::new();
        let code = SessionCode::new(code).expect("bad session code");
        let config = SessionConfig::default().with_command_timeout(WAIT);
        let (gm, events) =
            start_gm(&network, TicTacToe, code.clone(), &config).expect("start_gm failed");
        Self {
            network,
            code,
            gm,
            events,
            config,
        }
    }

    /// Join as `tag`. The request is sent but not yet answered.
    pub fn join(&self, tag: &str) -> TestPlayer {
        let controller = PlayerController::join(&self.network, &self.code, tag, &self.config)
            .expect("PlayerController::join failed");
        TestPlayer {
            controller,
            log: Vec::new(),
        }
    }

    /// Block until the host is told about a join request from `tag`.
    /// Other observer events are skipped.
    pub fn wait_for_request(&self, tag: &str) -> EndpointId {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(GmEvent::JoinRequested(participant)) if participant.tag == tag => {
                    return participant.endpoint;
                }
                Ok(_) => {}
                Err(e) => panic!("no join request from {tag}: {e}"),
            }
        }
    }

    /// Block until the observer channel reports lost presence.
    pub fn wait_for_presence_lost(&self) {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(GmEvent::PresenceLost) => return,
                Ok(_) => {}
                Err(e) => panic!("presence loss never reported: {e}"),
            }
        }
    }

    /// Join as `tag`, have the host accept, and wait until the player sees
    /// itself in the lobby roster (so the follow-up `lobby-update` is
    /// consumed too).
    pub fn admit(&self, tag: &str) -> TestPlayer {
        let mut player = self.join(tag);
        let endpoint = self.wait_for_request(tag);
        self.gm.accept(&endpoint).expect("accept failed");
        player.wait_until("a seat in the lobby", |v| {
            v.screen == Screen::Lobby && v.lobby.iter().any(|p| p.endpoint == endpoint)
        });
        player
    }

    /// Seat two players and start the game. The first one plays X.
    pub fn started(&self, first: &str, second: &str) -> (TestPlayer, TestPlayer) {
        let mut x = self.admit(first);
        let mut o = self.admit(second);
        x.wait_until("a full lobby", |v| v.lobby.len() == 2);
        self.gm.start().expect("start failed");
        x.wait_for_screen(Screen::Game);
        o.wait_for_screen(Screen::Game);
        (x, o)
    }
}

/// A real player controller with blocking helpers and a message log.
pub struct TestPlayer {
    controller: PlayerController<Board, MemoryTransport>,
    /// Every GM message applied so far, in arrival order.
    pub log: Vec<Message<Board>>,
}

impl TestPlayer {
    pub fn view(&self) -> &PlayerView<Board> {
        self.controller.view()
    }

    pub fn endpoint(&self) -> &EndpointId {
        self.controller.endpoint()
    }

    pub fn is_my_turn(&self) -> bool {
        self.controller.is_my_turn()
    }

    /// Poll until `done` holds for the view.
    pub fn wait_until(&mut self, what: &str, done: impl Fn(&PlayerView<Board>) -> bool) {
        let deadline = Instant::now() + WAIT;
        while !done(self.controller.view()) {
            assert!(
                Instant::now() < deadline,
                "{}: timed out waiting for {what}; view: {:?}",
                self.controller.view().tag,
                self.controller.view()
            );
            let applied = self.controller.poll_timeout(POLL_SLICE);
            self.log.extend(applied);
        }
    }

    pub fn wait_for_screen(&mut self, screen: Screen) {
        self.wait_until(&format!("{screen:?}"), |v| v.screen == screen);
    }

    /// Keep polling for `quiet` and return whatever arrived.
    pub fn drain_for(&mut self, quiet: Duration) -> Vec<Message<Board>> {
        let deadline = Instant::now() + quiet;
        let mut arrived = Vec::new();
        while Instant::now() < deadline {
            arrived.extend(self.controller.poll_timeout(POLL_SLICE));
        }
        self.log.extend(arrived.iter().cloned());
        arrived
    }

    /// Propose placing our symbol on `cell` and wait for the GM's verdict.
    pub fn play(&mut self, cell: usize) -> MoveStatus {
        assert!(
            self.controller.make_move(TicTacToe::place(cell)),
            "{}: move could not be sent",
            self.view().tag
        );
        self.wait_until("a move result", |v| {
            v.last_move != Some(MoveStatus::Pending)
        });
        self.view()
            .last_move
            .clone()
            .expect("move result vanished")
    }

    /// Send a move for `cell` without waiting for the verdict.
    pub fn propose(&mut self, cell: usize) -> bool {
        self.controller.make_move(TicTacToe::place(cell))
    }

    /// Block until `count` move results have arrived in total and return
    /// their `ok` flags in arrival order.
    pub fn wait_for_results(&mut self, count: usize) -> Vec<bool> {
        let deadline = Instant::now() + WAIT;
        loop {
            let results: Vec<bool> = self
                .log
                .iter()
                .filter_map(|m| match m {
                    Message::MoveResult { ok, .. } => Some(*ok),
                    _ => None,
                })
                .collect();
            if results.len() >= count {
                return results;
            }
            assert!(
                Instant::now() < deadline,
                "{}: got {} of {count} move results",
                self.view().tag,
                results.len()
            );
            let applied = self.controller.poll_timeout(POLL_SLICE);
            self.log.extend(applied);
        }
    }

    /// Message kinds received so far, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.log.iter().map(Message::kind).collect()
    }

    pub fn leave(self) {
        self.controller.leave();
    }
}
