// GM event loop.
//
// Architecture: one consumer thread, one typed channel.
//
// - **Transport threads** (or, for the memory network, whoever sends) push
//   `TransportEvent`s into the channel through the transport's event sink.
// - **Host commands** (`GmHandle::accept`, `start`, ...) go into the same
//   channel as `GmInput::Command`, each carrying a one-shot reply channel.
// - **GM thread**: owns the `GmController`, receives inputs in arrival order
//   and dispatches them. It is the only code that touches session state or
//   writes to the transport.
//
// The transport's sink keeps a sender alive for as long as the transport
// lives, so the channel never disconnects on its own. Shutdown is an
// explicit `GmInput::Stop`, sent by `GmHandle::stop` or on drop; the thread
// then shuts the transport down and exits.
//
// Host commands wait at most `SessionConfig::command_timeout` for their
// reply and fail with `SessionError::EventLoopGone` after that.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use peerplay_protocol::{EndpointId, Participant, SessionCode};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::gm::{GmController, GmEvent};
use crate::ruleset::Ruleset;
use crate::state::SessionSnapshot;
use crate::transport::{Network, Transport, TransportEvent, channel_sink};

type Reply<V> = Sender<Result<V>>;

/// Host-side requests executed on the GM thread.
enum HostCommand<B> {
    Accept {
        endpoint: EndpointId,
        reply: Reply<Participant>,
    },
    Reject {
        endpoint: EndpointId,
        reason: Option<String>,
        reply: Reply<()>,
    },
    Start {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot<B>>,
    },
}

/// Everything the GM thread consumes.
enum GmInput<B> {
    Transport(TransportEvent),
    Command(HostCommand<B>),
    Stop,
}

impl<B> From<TransportEvent> for GmInput<B> {
    fn from(event: TransportEvent) -> Self {
        GmInput::Transport(event)
    }
}

/// Handle returned by `start_gm` to drive and stop the running session.
pub struct GmHandle<B> {
    tx: Sender<GmInput<B>>,
    thread: Option<thread::JoinHandle<()>>,
    session_code: SessionCode,
    endpoint: EndpointId,
    command_timeout: Duration,
}

impl<B> GmHandle<B> {
    pub fn session_code(&self) -> &SessionCode {
        &self.session_code
    }

    /// The GM's endpoint identity, as players derive it.
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn accept(&self, endpoint: &EndpointId) -> Result<Participant> {
        self.request(|reply| HostCommand::Accept {
            endpoint: endpoint.clone(),
            reply,
        })
    }

    /// `reason` defaults to a generic "rejected by GM" message.
    pub fn reject(&self, endpoint: &EndpointId, reason: Option<String>) -> Result<()> {
        self.request(|reply| HostCommand::Reject {
            endpoint: endpoint.clone(),
            reason,
            reply,
        })
    }

    pub fn start(&self) -> Result<()> {
        self.request(|reply| HostCommand::Start { reply })
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot<B>> {
        self.request(|reply| HostCommand::Snapshot { reply })
    }

    /// Signal the GM thread to close the session and wait for it.
    pub fn stop(mut self) {
        self.stop_thread();
    }

    fn request<V>(
        &self,
        command: impl FnOnce(Reply<V>) -> HostCommand<B>,
    ) -> Result<V> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(GmInput::Command(command(reply_tx)))
            .map_err(|_| SessionError::EventLoopGone)?;
        reply_rx
            .recv_timeout(self.command_timeout)
            .map_err(|_| SessionError::EventLoopGone)?
    }

    fn stop_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.tx.send(GmInput::Stop);
            let _ = handle.join();
        }
    }
}

impl<B> Drop for GmHandle<B> {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Bind the GM identity for `session_code` on `network` and run the session
/// on a background thread. Returns the control handle and the observer
/// channel (which starts with a snapshot of the open lobby).
pub fn start_gm<N, R>(
    network: &N,
    ruleset: R,
    session_code: SessionCode,
    config: &SessionConfig,
) -> Result<(GmHandle<R::Board>, Receiver<GmEvent<R::Board>>)>
where
    N: Network,
    R: Ruleset,
{
    let (tx, rx) = mpsc::channel::<GmInput<R::Board>>();
    let endpoint = EndpointId::game_master(&session_code);
    let transport = network.connect_as_endpoint(&endpoint, channel_sink(tx.clone()))?;

    let mut gm = GmController::new(ruleset, transport, session_code.clone())?;
    let events = gm.subscribe();
    let thread = thread::spawn(move || run_gm(gm, rx));

    Ok((
        GmHandle {
            tx,
            thread: Some(thread),
            session_code,
            endpoint,
            command_timeout: config.command_timeout,
        },
        events,
    ))
}

/// Main GM loop. Runs until `Stop` arrives or every sender is gone.
fn run_gm<R: Ruleset, T: Transport>(mut gm: GmController<R, T>, rx: Receiver<GmInput<R::Board>>) {
    while let Ok(input) = rx.recv() {
        match input {
            GmInput::Transport(event) => gm.handle_event(event),
            GmInput::Command(command) => execute(&mut gm, command),
            GmInput::Stop => break,
        }
    }
    debug!(session = %gm.session_code(), "GM loop exiting");
    gm.shutdown();
}

/// Run one host command and answer on its reply channel. A caller that
/// timed out has dropped its receiver; the result is discarded.
fn execute<R: Ruleset, T: Transport>(gm: &mut GmController<R, T>, command: HostCommand<R::Board>) {
    match command {
        HostCommand::Accept { endpoint, reply } => {
            let _ = reply.send(gm.accept(&endpoint));
        }
        HostCommand::Reject {
            endpoint,
            reason,
            reply,
        } => {
            let _ = reply.send(gm.reject(&endpoint, reason));
        }
        HostCommand::Start { reply } => {
            let _ = reply.send(gm.start());
        }
        HostCommand::Snapshot { reply } => {
            let _ = reply.send(Ok(gm.snapshot()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionPhase;
    use crate::tictactoe::TicTacToe;
    use crate::transport::memory::MemoryNetwork;

    fn code() -> SessionCode {
        SessionCode::new("LOOPER").unwrap()
    }

    #[test]
    fn handle_answers_commands_from_the_loop() {
        let network = MemoryNetwork::new();
        let (handle, events) =
            start_gm(&network, TicTacToe, code(), &SessionConfig::default()).unwrap();

        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            GmEvent::Snapshot(snapshot) => assert_eq!(snapshot.phase, SessionPhase::LobbyOpen),
            other => panic!("expected Snapshot, got {other:?}"),
        }
        assert!(network.is_listed(handle.endpoint()));

        let stranger = EndpointId::player(&code(), "nobody").unwrap();
        assert!(matches!(
            handle.accept(&stranger),
            Err(SessionError::NotQueued(_))
        ));
        assert!(matches!(
            handle.start(),
            Err(SessionError::LobbyNotFull {
                required: 2,
                present: 0
            })
        ));
        assert_eq!(handle.snapshot().unwrap().phase, SessionPhase::LobbyOpen);
    }

    #[test]
    fn second_gm_for_same_code_is_refused() {
        let network = MemoryNetwork::new();
        let (_first, _events) =
            start_gm(&network, TicTacToe, code(), &SessionConfig::default()).unwrap();
        assert!(matches!(
            start_gm(&network, TicTacToe, code(), &SessionConfig::default()),
            Err(SessionError::Transport(_))
        ));
    }

    #[test]
    fn stop_releases_the_identity() {
        let network = MemoryNetwork::new();
        let (handle, _events) =
            start_gm(&network, TicTacToe, code(), &SessionConfig::default()).unwrap();
        let gm = handle.endpoint().clone();
        handle.stop();
        assert!(!network.is_listed(&gm));

        // A fresh session can take the code over.
        let (again, _events) =
            start_gm(&network, TicTacToe, code(), &SessionConfig::default()).unwrap();
        assert_eq!(again.session_code(), &code());
    }
}
