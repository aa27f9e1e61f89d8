// Player controller.
//
// Drives one player's view of a session. Construction derives the GM's
// identity from the session code, binds the player's own identity, dials the
// GM and sends `join-request`. After that the controller is passive: the
// host application calls `poll` (or `poll_timeout`) to drain transport
// events, each of which is applied to the `PlayerView` mirror, and
// `make_move` to propose an action.
//
// The view is only ever written from GM messages. State-bearing messages
// replace the game mirror wholesale, `lobby-update` replaces queue and lobby
// wholesale, and `player-disconnected` only prunes the active list. A move
// is sent as a proposal and the mirror changes when the GM's `state-update`
// arrives, never before.
//
// Failures are view state, not errors: a connect failure, a `join-rejected`
// or losing the GM link all land in `PlayerView::error` with the screen
// back at `PreSession`. Only a malformed tag is refused up front.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use peerplay_protocol::{
    CodecError, EndpointId, GameState, Message, Outcome, Participant, SessionCode, decode, encode,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::transport::{Network, Transport, TransportEvent, channel_sink};

/// Error shown when the link to the GM drops.
pub const GM_LOST: &str = "disconnected from GM";

/// Which part of the session the player is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    PreSession,
    /// Join request sent, waiting for the host.
    Queued,
    Lobby,
    Game,
    GameOver,
}

/// The GM's verdict on the player's most recent move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveStatus {
    Pending,
    Accepted,
    Rejected(String),
}

/// Everything a player UI needs to render.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView<B> {
    pub session_code: SessionCode,
    pub tag: String,
    pub screen: Screen,
    pub connected: bool,
    /// Our own participant record once accepted.
    pub me: Option<Participant>,
    pub lobby: Vec<Participant>,
    pub queue: Vec<Participant>,
    pub game: Option<GameState<B>>,
    pub outcome: Option<Outcome>,
    pub last_move: Option<MoveStatus>,
    pub error: Option<String>,
}

impl<B> PlayerView<B> {
    fn new(session_code: SessionCode, tag: &str) -> Self {
        Self {
            session_code,
            tag: tag.trim().to_string(),
            screen: Screen::PreSession,
            connected: false,
            me: None,
            lobby: Vec::new(),
            queue: Vec::new(),
            game: None,
            outcome: None,
            last_move: None,
            error: None,
        }
    }

    /// True when a game is running and the turn marker is ours.
    pub fn is_my_turn(&self) -> bool {
        let (Some(me), Some(game)) = (&self.me, &self.game) else {
            return false;
        };
        game.is_in_progress()
            && game.participant(me.id).is_some()
            && game.turn == Some(me.symbol)
    }

    /// Back to the pre-session screen with `error` shown. The final outcome
    /// of a finished game is kept.
    fn reset(&mut self, error: impl Into<String>) {
        self.screen = Screen::PreSession;
        self.connected = false;
        self.me = None;
        self.lobby.clear();
        self.queue.clear();
        self.game = None;
        self.last_move = None;
        self.error = Some(error.into());
    }
}

pub struct PlayerController<B, T: Transport> {
    view: PlayerView<B>,
    endpoint: EndpointId,
    gm: EndpointId,
    transport: Option<T>,
    inbox: Receiver<TransportEvent>,
}

impl<B, T> PlayerController<B, T>
where
    B: Clone + DeserializeOwned + serde::Serialize,
    T: Transport,
{
    /// Join the session `session_code` as `tag`.
    ///
    /// Fails only for an unusable tag. Connection problems are reported in
    /// the returned controller's view.
    pub fn join<N>(
        network: &N,
        session_code: &SessionCode,
        tag: &str,
        config: &SessionConfig,
    ) -> Result<Self>
    where
        N: Network<Transport = T>,
    {
        let endpoint = EndpointId::player(session_code, tag)?;
        let gm = EndpointId::game_master(session_code);
        let (tx, inbox) = mpsc::channel();

        let mut player = Self {
            view: PlayerView::new(session_code.clone(), tag),
            endpoint,
            gm,
            transport: None,
            inbox,
        };

        let transport = match network.connect_as_endpoint(&player.endpoint, channel_sink(tx)) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(endpoint = %player.endpoint, error = %e, "could not bind player identity");
                player.view.error = Some(e.to_string());
                return Ok(player);
            }
        };
        if let Err(e) = transport.connect_to(&player.gm, config.connect_timeout) {
            warn!(gm = %player.gm, error = %e, "could not reach GM");
            player.view.error = Some(e.to_string());
            return Ok(player);
        }
        player.transport = Some(transport);
        player.view.connected = true;

        let request = Message::JoinRequest {
            tag: player.view.tag.clone(),
            endpoint: player.endpoint.clone(),
        };
        if player.send(request) {
            player.view.screen = Screen::Queued;
            info!(session = %session_code, tag = %player.view.tag, "join request sent");
        } else {
            player.lose_gm();
        }
        Ok(player)
    }

    pub fn view(&self) -> &PlayerView<B> {
        &self.view
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn is_my_turn(&self) -> bool {
        self.view.is_my_turn()
    }

    /// Apply every pending event without blocking. Returns the GM messages
    /// applied, in order.
    pub fn poll(&mut self) -> Vec<Message<B>> {
        let mut applied = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            applied.extend(self.apply_event(event));
        }
        applied
    }

    /// Like `poll`, but waits up to `timeout` for the first event.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<Message<B>> {
        let Ok(event) = self.inbox.recv_timeout(timeout) else {
            return Vec::new();
        };
        let mut applied: Vec<Message<B>> = self.apply_event(event).into_iter().collect();
        applied.extend(self.poll());
        applied
    }

    /// Propose an action to the GM. Returns `false` when there is no
    /// participant record or no link to send it on.
    pub fn make_move(&mut self, action: serde_json::Value) -> bool {
        let Some(me) = &self.view.me else {
            self.view.error = Some("not a participant in this session".into());
            return false;
        };
        let command = Message::MoveCommand {
            participant_id: me.id,
            action,
        };
        if !self.send(command) {
            return false;
        }
        self.view.last_move = Some(MoveStatus::Pending);
        true
    }

    /// Close the link and release the identity.
    pub fn leave(mut self) {
        if let Some(transport) = self.transport.take() {
            info!(tag = %self.view.tag, "leaving session");
            transport.shutdown();
        }
    }

    fn send(&self, message: Message<B>) -> bool {
        let Some(transport) = &self.transport else {
            return false;
        };
        let kind = message.kind();
        match encode(message) {
            Ok(bytes) => {
                let sent = transport.send(&self.gm, &bytes);
                if !sent {
                    warn!(kind, "send to GM failed");
                }
                sent
            }
            Err(e) => {
                warn!(kind, error = %e, "failed to encode message");
                false
            }
        }
    }

    fn apply_event(&mut self, event: TransportEvent) -> Option<Message<B>> {
        match event {
            TransportEvent::MessageReceived { from, payload } => {
                if from != self.gm {
                    debug!(%from, "ignoring message from a non-GM peer");
                    return None;
                }
                match decode::<B>(&payload) {
                    Ok(envelope) => {
                        self.apply(envelope.message.clone());
                        Some(envelope.message)
                    }
                    Err(CodecError::UnknownType(kind)) => {
                        debug!(%kind, "ignoring unknown message type");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable message");
                        None
                    }
                }
            }
            TransportEvent::ConnectionClosed { remote } if remote == self.gm => {
                if self.view.connected {
                    self.lose_gm();
                }
                None
            }
            TransportEvent::ConnectionOpened { .. } | TransportEvent::ConnectionClosed { .. } => {
                None
            }
            TransportEvent::PresenceLost => {
                debug!(endpoint = %self.endpoint, "player lost directory presence");
                None
            }
        }
    }

    /// Dispatch one GM message onto the view.
    fn apply(&mut self, message: Message<B>) {
        match message {
            Message::JoinAccepted {
                participant,
                in_lobby,
            } => {
                info!(symbol = %participant.symbol, "joined session");
                self.view.me = Some(participant);
                self.view.screen = if in_lobby { Screen::Lobby } else { Screen::Queued };
                self.view.error = None;
            }
            Message::JoinRejected { reason } => {
                info!(%reason, "join rejected");
                self.drop_link();
                self.view.reset(reason);
            }
            Message::LobbyUpdate { lobby, queue } => {
                let seated = self
                    .view
                    .me
                    .as_ref()
                    .and_then(|me| lobby.iter().find(|p| p.id == me.id))
                    .cloned();
                if seated.is_some() {
                    self.view.me = seated;
                }
                self.view.lobby = lobby;
                self.view.queue = queue;
            }
            Message::GameStarted { state } => {
                self.view.game = Some(state);
                self.view.outcome = None;
                self.view.screen = Screen::Game;
            }
            Message::StateUpdate { state } | Message::YourTurn { state } => {
                self.view.game = Some(state);
            }
            Message::GameOver { state, outcome } => {
                self.view.game = Some(state);
                self.view.outcome = outcome;
                self.view.screen = Screen::GameOver;
            }
            Message::PlayerDisconnected {
                participant_id,
                tag,
            } => {
                info!(%tag, "participant disconnected");
                if let Some(game) = &mut self.view.game {
                    game.participants.retain(|p| p.id != participant_id);
                }
            }
            Message::MoveResult { ok, error } => {
                self.view.last_move = Some(if ok {
                    MoveStatus::Accepted
                } else {
                    MoveStatus::Rejected(error.unwrap_or_default())
                });
            }
            other @ (Message::JoinRequest { .. } | Message::MoveCommand { .. }) => {
                debug!(kind = other.kind(), "ignoring GM-bound message");
            }
        }
    }

    fn lose_gm(&mut self) {
        warn!(gm = %self.gm, "lost connection to GM");
        self.drop_link();
        self.view.reset(GM_LOST);
    }

    fn drop_link(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }
}
