// Game Master controller.
//
// `GmController` owns the authoritative `SessionState`, the ruleset and the
// GM's transport. It is driven from exactly one thread: `server.rs` feeds it
// transport events and host commands from a single channel, so every
// mutation below is serialized and moves are judged strictly in arrival
// order.
//
// Inbound handling (`handle_event`):
// - `join-request`: validated against the sender, then queued, refused with
//   `join-rejected`, or ignored as a duplicate.
// - `move-command`: judged by the ruleset. The verdict goes back to the
//   mover as `move-result`; accepted moves also broadcast `state-update`
//   followed by `game-over` or a `your-turn` unicast.
// - Connection closed: queue/lobby members are dropped with a
//   `lobby-update`; an active participant is dropped with
//   `player-disconnected`, and a lone survivor wins by `game-over`.
// - Anything else (unknown types, player-bound messages) is logged and
//   skipped.
//
// Host commands (`accept`, `reject`, `start`) return `Result` to the host;
// they never reach players as errors.
//
// Observers registered with `subscribe` get a `GmEvent::Snapshot` after
// every mutation plus notifications the host UI needs to act on. Failures
// never escape the session: a failed unicast or encode is logged and the
// loop carries on.

use std::sync::mpsc::{self, Receiver, Sender};

use peerplay_protocol::{
    CodecError, EndpointId, Message, Participant, ParticipantId, SessionCode, decode, encode,
};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::ruleset::{Ruleset, Verdict};
use crate::state::{Admission, Departure, SessionPhase, SessionSnapshot, SessionState};
use crate::transport::{Transport, TransportEvent};

/// Reason sent when the host turns a request down without giving one.
pub const REASON_HOST_REJECTED: &str = "request rejected by GM";

/// Reason sent when a join request names an endpoint other than the sender
/// or one from another session.
pub const REASON_BAD_IDENTITY: &str = "endpoint does not belong to this session";

/// Move answer when no game is running.
pub const REASON_NO_GAME: &str = "game is not in progress";

/// Notifications for the hosting application.
#[derive(Clone, Debug, PartialEq)]
pub enum GmEvent<B> {
    /// State after a mutation.
    Snapshot(SessionSnapshot<B>),
    /// A new participant is waiting in the queue for accept/reject.
    JoinRequested(Participant),
    /// The GM is no longer listed in the directory. The session goes on.
    PresenceLost,
}

pub struct GmController<R: Ruleset, T: Transport> {
    ruleset: R,
    transport: T,
    state: SessionState<R::Board>,
    observers: Vec<Sender<GmEvent<R::Board>>>,
}

impl<R: Ruleset, T: Transport> GmController<R, T> {
    /// Take over a transport already bound to the GM identity and open the
    /// lobby.
    pub fn new(ruleset: R, transport: T, session_code: SessionCode) -> Result<Self, SessionError> {
        let mut state = SessionState::new(session_code, ruleset.required_players());
        state.open_lobby()?;
        info!(
            session = %state.session_code(),
            ruleset = ruleset.name(),
            endpoint = %transport.local_endpoint(),
            "session open"
        );
        Ok(Self {
            ruleset,
            transport,
            state,
            observers: Vec::new(),
        })
    }

    pub fn session_code(&self) -> &SessionCode {
        self.state.session_code()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn snapshot(&self) -> SessionSnapshot<R::Board> {
        self.state.snapshot()
    }

    /// Register an observer. It immediately receives the current snapshot.
    pub fn subscribe(&mut self) -> Receiver<GmEvent<R::Board>> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(GmEvent::Snapshot(self.state.snapshot()));
        self.observers.push(tx);
        rx
    }

    // -----------------------------------------------------------------
    // Transport input
    // -----------------------------------------------------------------

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionOpened { remote } => {
                debug!(%remote, "peer connected");
            }
            TransportEvent::ConnectionClosed { remote } => self.handle_disconnect(&remote),
            TransportEvent::MessageReceived { from, payload } => {
                match decode::<R::Board>(&payload) {
                    Ok(envelope) => self.handle_message(&from, envelope.message),
                    Err(CodecError::UnknownType(kind)) => {
                        debug!(%from, %kind, "ignoring unknown message type");
                    }
                    Err(e) => warn!(%from, error = %e, "dropping undecodable message"),
                }
            }
            TransportEvent::PresenceLost => {
                warn!(session = %self.state.session_code(), "GM lost directory presence");
                self.notify(GmEvent::PresenceLost);
            }
        }
    }

    fn handle_message(&mut self, from: &EndpointId, message: Message<R::Board>) {
        match message {
            Message::JoinRequest { tag, endpoint } => self.handle_join(from, &tag, endpoint),
            Message::MoveCommand {
                participant_id,
                action,
            } => self.handle_move(from, participant_id, &action),
            other => debug!(%from, kind = other.kind(), "ignoring message not meant for the GM"),
        }
    }

    fn handle_join(&mut self, from: &EndpointId, tag: &str, endpoint: EndpointId) {
        if &endpoint != from || !endpoint.belongs_to(self.state.session_code()) {
            warn!(%from, claimed = %endpoint, "join request with foreign identity");
            self.send(from, Message::JoinRejected {
                reason: REASON_BAD_IDENTITY.into(),
            });
            return;
        }

        match self.state.admit(tag, endpoint) {
            Admission::Queued(participant) => {
                info!(
                    id = %participant.id,
                    tag = %participant.tag,
                    "join request queued"
                );
                self.notify(GmEvent::JoinRequested(participant));
                self.publish();
            }
            Admission::Duplicate => debug!(%from, "duplicate join request ignored"),
            Admission::Refused(reason) => {
                info!(%from, reason, "join request refused");
                self.send(from, Message::JoinRejected {
                    reason: reason.into(),
                });
            }
        }
    }

    fn handle_move(&mut self, from: &EndpointId, actor: ParticipantId, action: &serde_json::Value) {
        let game = match self.state.game() {
            Some(game) if self.state.phase() == SessionPhase::InProgress => game,
            _ => {
                self.send(from, Message::move_failed(REASON_NO_GAME));
                return;
            }
        };
        let Some(mover) = game.participant(actor).map(|p| p.endpoint.clone()) else {
            debug!(%from, %actor, "move from unknown participant");
            self.send(from, Message::move_failed("participant not found in game"));
            return;
        };

        match self.ruleset.validate_action(game, actor, action) {
            Verdict::Rejected { reason } => {
                debug!(%actor, %reason, "move rejected");
                self.send(&mover, Message::move_failed(reason));
            }
            Verdict::Accepted { next, outcome } => {
                debug!(%actor, %action, "move accepted");
                let terminal = outcome.is_some() || self.ruleset.is_terminal(&next);
                let outcome = outcome.or_else(|| self.ruleset.outcome(&next));
                self.state.apply(next);
                let current = if terminal {
                    self.state.finish(outcome)
                } else {
                    self.state.game()
                };
                let Some(current) = current.cloned() else {
                    return;
                };

                self.send(&mover, Message::move_ok());
                self.broadcast(Message::StateUpdate {
                    state: current.clone(),
                });
                if terminal {
                    match current.outcome {
                        Some(result) => info!(%result, "game over"),
                        None => info!("game over"),
                    }
                    let outcome = current.outcome;
                    self.broadcast(Message::GameOver {
                        state: current,
                        outcome,
                    });
                } else if let Some(holder) = current.turn_holder().map(|p| p.endpoint.clone()) {
                    self.send(&holder, Message::YourTurn { state: current });
                }
                self.publish();
            }
        }
    }

    fn handle_disconnect(&mut self, remote: &EndpointId) {
        match self.state.depart(remote) {
            Departure::Unknown => debug!(%remote, "non-participant disconnected"),
            Departure::PreGame(participant) => {
                info!(tag = %participant.tag, "participant left before the game");
                self.broadcast_lobby();
                self.publish();
            }
            Departure::Active {
                participant,
                forfeit,
            } => {
                info!(tag = %participant.tag, "active participant disconnected");
                self.broadcast(Message::PlayerDisconnected {
                    participant_id: participant.id,
                    tag: participant.tag,
                });
                if let Some(result) = forfeit {
                    info!(%result, "game over by forfeit");
                    if let Some(game) = self.state.game().cloned() {
                        self.broadcast(Message::GameOver {
                            state: game,
                            outcome: Some(result),
                        });
                    }
                }
                self.publish();
            }
        }
    }

    // -----------------------------------------------------------------
    // Host commands
    // -----------------------------------------------------------------

    /// Promote a queued participant into the lobby.
    pub fn accept(&mut self, endpoint: &EndpointId) -> Result<Participant, SessionError> {
        let participant = self.state.promote(endpoint)?;
        info!(
            tag = %participant.tag,
            symbol = %participant.symbol,
            "participant accepted"
        );
        self.send(endpoint, Message::JoinAccepted {
            participant: participant.clone(),
            in_lobby: true,
        });
        self.broadcast_lobby();
        self.publish();
        Ok(participant)
    }

    /// Turn down a queued participant. No broadcast.
    pub fn reject(&mut self, endpoint: &EndpointId, reason: Option<String>) -> Result<(), SessionError> {
        let participant = self.state.remove_queued(endpoint)?;
        let reason = reason.unwrap_or_else(|| REASON_HOST_REJECTED.into());
        info!(tag = %participant.tag, %reason, "participant rejected");
        self.send(endpoint, Message::JoinRejected { reason });
        self.publish();
        Ok(())
    }

    /// Start the game once the lobby is full.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let participants = self.state.ready_to_start()?;
        let game = self
            .ruleset
            .initial_state(participants, self.state.session_code())?;
        info!(
            session = %self.state.session_code(),
            ruleset = self.ruleset.name(),
            "game started"
        );
        self.state.begin(game.clone());
        self.broadcast(Message::GameStarted { state: game });
        self.publish();
        Ok(())
    }

    /// Close every link and give up the GM identity.
    pub fn shutdown(self) {
        info!(session = %self.state.session_code(), "session closed");
        self.transport.shutdown();
    }

    // -----------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------

    fn send(&self, to: &EndpointId, message: Message<R::Board>) {
        let kind = message.kind();
        match encode(message) {
            Ok(bytes) => {
                if !self.transport.send(to, &bytes) {
                    warn!(%to, kind, "unicast failed, no live link");
                }
            }
            Err(e) => warn!(%to, kind, error = %e, "failed to encode message"),
        }
    }

    fn broadcast(&self, message: Message<R::Board>) {
        let kind = message.kind();
        match encode(message) {
            Ok(bytes) => {
                let delivered = self.transport.broadcast(&bytes);
                debug!(kind, delivered, "broadcast");
            }
            Err(e) => warn!(kind, error = %e, "failed to encode message"),
        }
    }

    fn broadcast_lobby(&self) {
        self.broadcast(Message::LobbyUpdate {
            lobby: self.state.lobby().to_vec(),
            queue: self.state.queue().to_vec(),
        });
    }

    fn notify(&mut self, event: GmEvent<R::Board>) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish(&mut self) {
        self.notify(GmEvent::Snapshot(self.state.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use peerplay_protocol::{Envelope, GameState, GameStatus, Outcome, Symbol};

    use super::*;
    use crate::error::RulesetError;
    use crate::tictactoe::{Board, TicTacToe};
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use crate::transport::{Network, channel_sink};

    type Gm = GmController<TicTacToe, MemoryTransport>;

    /// A bare player endpoint that speaks the wire protocol directly.
    struct Peer {
        endpoint: EndpointId,
        _transport: MemoryTransport,
        inbox: Receiver<TransportEvent>,
    }

    impl Peer {
        fn join<R: Ruleset<Board = Board>>(
            network: &MemoryNetwork,
            gm: &mut GmController<R, MemoryTransport>,
            tag: &str,
        ) -> Self {
            let peer = Self::connect(network, gm, tag);
            peer.send(gm, Message::JoinRequest {
                tag: tag.into(),
                endpoint: peer.endpoint.clone(),
            });
            peer
        }

        fn connect<R: Ruleset<Board = Board>>(
            network: &MemoryNetwork,
            gm: &GmController<R, MemoryTransport>,
            tag: &str,
        ) -> Self {
            let endpoint = EndpointId::player(gm.session_code(), tag).unwrap();
            let (tx, inbox) = mpsc::channel();
            let transport = network
                .connect_as_endpoint(&endpoint, channel_sink(tx))
                .unwrap();
            transport
                .connect_to(&EndpointId::game_master(gm.session_code()), Duration::from_secs(1))
                .unwrap();
            let peer = Self {
                endpoint,
                _transport: transport,
                inbox,
            };
            peer.drain();
            peer
        }

        /// Deliver a message straight into the GM, as the event loop would.
        fn send<R: Ruleset<Board = Board>>(
            &self,
            gm: &mut GmController<R, MemoryTransport>,
            message: Message<Board>,
        ) {
            gm.handle_event(TransportEvent::MessageReceived {
                from: self.endpoint.clone(),
                payload: encode(message).unwrap(),
            });
        }

        fn play<R: Ruleset<Board = Board>>(
            &self,
            gm: &mut GmController<R, MemoryTransport>,
            id: ParticipantId,
            position: usize,
        ) {
            self.send(gm, Message::MoveCommand {
                participant_id: id,
                action: TicTacToe::place(position),
            });
        }

        fn drain(&self) -> Vec<Message<Board>> {
            self.inbox
                .try_iter()
                .filter_map(|event| match event {
                    TransportEvent::MessageReceived { payload, .. } => {
                        let envelope: Envelope<Board> = decode(&payload).unwrap();
                        Some(envelope.message)
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn host(network: &MemoryNetwork) -> (Gm, Receiver<TransportEvent>) {
        host_with(network, TicTacToe)
    }

    fn host_with<R: Ruleset>(
        network: &MemoryNetwork,
        ruleset: R,
    ) -> (GmController<R, MemoryTransport>, Receiver<TransportEvent>) {
        let code = SessionCode::new("ABCDEF").unwrap();
        let (tx, rx) = mpsc::channel();
        let transport = network
            .connect_as_endpoint(&EndpointId::game_master(&code), channel_sink(tx))
            .unwrap();
        (GmController::new(ruleset, transport, code).unwrap(), rx)
    }

    fn kinds(messages: &[Message<Board>]) -> Vec<&'static str> {
        messages.iter().map(Message::kind).collect()
    }

    /// alice (X) and bob (O) seated, game started, inboxes drained.
    fn started(network: &MemoryNetwork) -> (Gm, Peer, Peer) {
        started_with(network, TicTacToe)
    }

    fn started_with<R: Ruleset<Board = Board>>(
        network: &MemoryNetwork,
        ruleset: R,
    ) -> (GmController<R, MemoryTransport>, Peer, Peer) {
        let (mut gm, _rx) = host_with(network, ruleset);
        let alice = Peer::join(network, &mut gm, "alice");
        let bob = Peer::join(network, &mut gm, "bob");
        gm.accept(&alice.endpoint).unwrap();
        gm.accept(&bob.endpoint).unwrap();
        gm.start().unwrap();
        alice.drain();
        bob.drain();
        (gm, alice, bob)
    }

    #[test]
    fn join_queues_without_broadcast_and_notifies_host() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let events = gm.subscribe();
        let alice = Peer::join(&network, &mut gm, "alice");

        assert!(alice.drain().is_empty());
        let snapshot = gm.snapshot();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.phase, SessionPhase::LobbyOpen);

        let seen: Vec<GmEvent<Board>> = events.try_iter().collect();
        assert!(seen.iter().any(|e| matches!(e, GmEvent::JoinRequested(p) if p.tag == "alice")));
    }

    #[test]
    fn join_with_someone_elses_identity_is_rejected() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let mallory = Peer::connect(&network, &gm, "mallory");
        let alice = EndpointId::player(gm.session_code(), "alice").unwrap();
        mallory.send(&mut gm, Message::JoinRequest {
            tag: "alice".into(),
            endpoint: alice,
        });
        assert_eq!(
            mallory.drain(),
            vec![Message::JoinRejected {
                reason: REASON_BAD_IDENTITY.into()
            }]
        );
        assert!(gm.snapshot().queue.is_empty());
    }

    #[test]
    fn accept_unicasts_then_broadcasts_lobby() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let alice = Peer::join(&network, &mut gm, "alice");
        let bob = Peer::join(&network, &mut gm, "bob");

        let accepted = gm.accept(&alice.endpoint).unwrap();
        assert_eq!(accepted.symbol, Symbol::X);

        let to_alice = alice.drain();
        assert_eq!(kinds(&to_alice), vec!["join-accepted", "lobby-update"]);
        match &to_alice[0] {
            Message::JoinAccepted {
                participant,
                in_lobby,
            } => {
                assert!(in_lobby);
                assert_eq!(participant.symbol, Symbol::X);
            }
            other => panic!("expected JoinAccepted, got {other:?}"),
        }
        match bob.drain().as_slice() {
            [Message::LobbyUpdate { lobby, queue }] => {
                assert_eq!(lobby.len(), 1);
                assert_eq!(queue.len(), 1);
                assert_eq!(queue[0].tag, "bob");
            }
            other => panic!("expected one LobbyUpdate, got {other:?}"),
        }
    }

    #[test]
    fn reject_tells_only_the_rejected() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let alice = Peer::join(&network, &mut gm, "alice");
        let bob = Peer::join(&network, &mut gm, "bob");

        gm.reject(&bob.endpoint, None).unwrap();
        assert_eq!(
            bob.drain(),
            vec![Message::JoinRejected {
                reason: REASON_HOST_REJECTED.into()
            }]
        );
        assert!(alice.drain().is_empty());
        assert!(matches!(
            gm.reject(&bob.endpoint, None),
            Err(SessionError::NotQueued(_))
        ));
    }

    #[test]
    fn third_player_is_told_lobby_is_full() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let _alice = Peer::join(&network, &mut gm, "alice");
        let _bob = Peer::join(&network, &mut gm, "bob");
        let carol = Peer::join(&network, &mut gm, "carol");
        assert_eq!(
            carol.drain(),
            vec![Message::JoinRejected {
                reason: "lobby is full".into()
            }]
        );
    }

    #[test]
    fn start_needs_full_lobby() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let alice = Peer::join(&network, &mut gm, "alice");
        gm.accept(&alice.endpoint).unwrap();
        assert!(matches!(
            gm.start(),
            Err(SessionError::LobbyNotFull { .. })
        ));
        assert_eq!(gm.phase(), SessionPhase::LobbyOpen);
    }

    #[test]
    fn accepted_move_flow() {
        let network = MemoryNetwork::new();
        let (mut gm, alice, bob) = started(&network);
        let alice_id = gm.snapshot().lobby[0].id;

        alice.play(&mut gm, alice_id, 4);
        let to_alice = alice.drain();
        assert_eq!(kinds(&to_alice), vec!["move-result", "state-update"]);
        assert_eq!(to_alice[0], Message::move_ok());

        let to_bob = bob.drain();
        assert_eq!(kinds(&to_bob), vec!["state-update", "your-turn"]);
        match &to_bob[1] {
            Message::YourTurn { state } => {
                assert_eq!(state.board[4], Some(Symbol::X));
                assert_eq!(state.turn, Some(Symbol::O));
            }
            other => panic!("expected YourTurn, got {other:?}"),
        }
    }

    #[test]
    fn out_of_turn_move_is_private_and_harmless() {
        let network = MemoryNetwork::new();
        let (mut gm, alice, bob) = started(&network);
        let bob_id = gm.snapshot().lobby[1].id;
        let before = gm.snapshot().game;

        bob.play(&mut gm, bob_id, 0);
        match bob.drain().as_slice() {
            [Message::MoveResult { ok: false, error: Some(reason) }] => {
                assert!(reason.contains("not your turn"), "{reason}");
            }
            other => panic!("expected failed MoveResult, got {other:?}"),
        }
        assert!(alice.drain().is_empty());
        assert_eq!(gm.snapshot().game, before);
    }

    #[test]
    fn unknown_participant_answered_at_sender() {
        let network = MemoryNetwork::new();
        let (mut gm, _alice, bob) = started(&network);
        bob.play(&mut gm, ParticipantId(999), 0);
        assert_eq!(
            bob.drain(),
            vec![Message::move_failed("participant not found in game")]
        );
    }

    #[test]
    fn winning_move_ends_game() {
        let network = MemoryNetwork::new();
        let (mut gm, alice, bob) = started(&network);
        let lobby = gm.snapshot().lobby;
        let (a, b) = (lobby[0].id, lobby[1].id);

        for (peer, id, position) in [(&alice, a, 0), (&bob, b, 3), (&alice, a, 1), (&bob, b, 4)] {
            peer.play(&mut gm, id, position);
        }
        alice.drain();
        bob.drain();
        alice.play(&mut gm, a, 2);

        let to_bob = bob.drain();
        assert_eq!(kinds(&to_bob), vec!["state-update", "game-over"]);
        match &to_bob[1] {
            Message::GameOver { outcome, state } => {
                assert_eq!(*outcome, Some(Outcome::Winner(Symbol::X)));
                assert_eq!(state.turn, None);
            }
            other => panic!("expected GameOver, got {other:?}"),
        }
        assert_eq!(gm.phase(), SessionPhase::Finished);

        bob.play(&mut gm, b, 8);
        assert_eq!(
            bob.drain(),
            vec![Message::move_failed("game is not in progress")]
        );
    }

    /// Tic-tac-toe whose first accepted move ends the game. The end is
    /// reported only through the verdict; the returned board stays Playing.
    struct OneMove;

    impl Ruleset for OneMove {
        type Board = Board;

        fn name(&self) -> &str {
            "one-move"
        }

        fn required_players(&self) -> usize {
            TicTacToe.required_players()
        }

        fn initial_state(
            &self,
            participants: Vec<Participant>,
            session_code: &SessionCode,
        ) -> Result<GameState<Board>, RulesetError> {
            TicTacToe.initial_state(participants, session_code)
        }

        fn validate_action(
            &self,
            state: &GameState<Board>,
            actor: ParticipantId,
            action: &serde_json::Value,
        ) -> Verdict<Board> {
            match TicTacToe.validate_action(state, actor, action) {
                Verdict::Accepted { next, .. } => Verdict::Accepted {
                    next,
                    outcome: Some(Outcome::Draw),
                },
                rejected => rejected,
            }
        }
    }

    #[test]
    fn verdict_outcome_alone_finishes_the_session() {
        let network = MemoryNetwork::new();
        let (mut gm, alice, bob) = started_with(&network, OneMove);
        let lobby = gm.snapshot().lobby;
        let (a, b) = (lobby[0].id, lobby[1].id);

        alice.play(&mut gm, a, 4);
        let to_bob = bob.drain();
        assert_eq!(kinds(&to_bob), vec!["state-update", "game-over"]);
        match &to_bob[1] {
            Message::GameOver { outcome, state } => {
                assert_eq!(*outcome, Some(Outcome::Draw));
                assert_eq!(state.status, GameStatus::Finished);
                assert_eq!(state.turn, None);
            }
            other => panic!("expected GameOver, got {other:?}"),
        }
        assert_eq!(gm.phase(), SessionPhase::Finished);

        // The next move is judged against a finished session, not the board.
        bob.play(&mut gm, b, 0);
        assert_eq!(bob.drain(), vec![Message::move_failed(REASON_NO_GAME)]);
        let game = gm.snapshot().game.unwrap();
        assert_eq!(game.board.iter().flatten().count(), 1);
        assert_eq!(game.outcome, Some(Outcome::Draw));
    }

    #[test]
    fn active_disconnect_hands_win_to_survivor() {
        let network = MemoryNetwork::new();
        let (mut gm, alice, bob) = started(&network);
        let bob_record = gm.snapshot().lobby[1].clone();

        gm.handle_event(TransportEvent::ConnectionClosed {
            remote: bob.endpoint.clone(),
        });
        let to_alice = alice.drain();
        assert_eq!(kinds(&to_alice), vec!["player-disconnected", "game-over"]);
        assert_eq!(
            to_alice[0],
            Message::PlayerDisconnected {
                participant_id: bob_record.id,
                tag: "bob".into()
            }
        );
        match &to_alice[1] {
            Message::GameOver { outcome, .. } => {
                assert_eq!(*outcome, Some(Outcome::Winner(Symbol::X)));
            }
            other => panic!("expected GameOver, got {other:?}"),
        }
        assert_eq!(gm.phase(), SessionPhase::Finished);
    }

    #[test]
    fn lobby_disconnect_broadcasts_lobby_update() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let alice = Peer::join(&network, &mut gm, "alice");
        let bob = Peer::join(&network, &mut gm, "bob");
        gm.accept(&alice.endpoint).unwrap();
        alice.drain();
        bob.drain();

        gm.handle_event(TransportEvent::ConnectionClosed {
            remote: bob.endpoint.clone(),
        });
        match alice.drain().as_slice() {
            [Message::LobbyUpdate { lobby, queue }] => {
                assert_eq!(lobby.len(), 1);
                assert!(queue.is_empty());
            }
            other => panic!("expected one LobbyUpdate, got {other:?}"),
        }
    }

    #[test]
    fn garbage_and_unknown_types_are_skipped() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let alice = Peer::connect(&network, &gm, "alice");
        for payload in [&b"not json"[..], br#"{"type":"chat","timestamp":1,"text":"hi"}"#] {
            gm.handle_event(TransportEvent::MessageReceived {
                from: alice.endpoint.clone(),
                payload: payload.to_vec(),
            });
        }
        assert!(alice.drain().is_empty());
        assert!(gm.snapshot().queue.is_empty());
    }

    #[test]
    fn presence_loss_reaches_observers() {
        let network = MemoryNetwork::new();
        let (mut gm, _rx) = host(&network);
        let events = gm.subscribe();
        gm.handle_event(TransportEvent::PresenceLost);
        assert!(events.try_iter().any(|e| e == GmEvent::PresenceLost));
        assert_eq!(gm.phase(), SessionPhase::LobbyOpen);
    }
}
