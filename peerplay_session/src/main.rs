// CLI entry point for peerplay.
//
// Hosts or joins a tic-tac-toe session over TCP from the terminal.
//
// Usage:
//   peerplay host [--code <CODE>] [--listen <ADDR>] [--auto-accept]
//       Runs the GM. Prints the session code and listen address, then reads
//       host commands from stdin: `accept <tag>`, `reject <tag>`, `start`,
//       `status`, `quit`.
//   peerplay join --code <CODE> --tag <TAG> --gm <ADDR>
//       Joins as a player. Type a cell number (0-8) to move, `quit` to
//       leave.
//
// Both sides are built from the library: `start_gm` for the host and
// `PlayerController` for the player. The GM's address is passed in
// explicitly and seeded into the player's directory; there is no discovery
// service. Logging goes through `tracing`, filtered by `RUST_LOG` (default
// `info`).

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;

use clap::{Parser, Subcommand};
use peerplay_protocol::{EndpointId, Message, SessionCode};
use peerplay_session::gm::GmEvent;
use peerplay_session::server::GmHandle;
use peerplay_session::state::SessionSnapshot;
use peerplay_session::tictactoe::{self, Board, TicTacToe};
use peerplay_session::transport::tcp::{Directory, StaticDirectory, TcpNetwork, TcpTransport};
use peerplay_session::{PlayerController, Result, Screen, SessionConfig, SessionError, start_gm};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "peerplay")]
#[command(about = "Host-authoritative tic-tac-toe over peer links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Game Master for a new session
    Host {
        /// Session code (random six letters if omitted)
        #[arg(long)]
        code: Option<SessionCode>,
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: SocketAddr,
        /// Accept every join request without asking
        #[arg(long)]
        auto_accept: bool,
    },
    /// Join a session as a player
    Join {
        /// Session code given by the host
        #[arg(long)]
        code: SessionCode,
        /// Display tag
        #[arg(long)]
        tag: String,
        /// Address the host is listening on
        #[arg(long)]
        gm: SocketAddr,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::default();

    let result = match cli.command {
        Commands::Host {
            code,
            listen,
            auto_accept,
        } => host(code.unwrap_or_else(SessionCode::random), listen, auto_accept, &config),
        Commands::Join { code, tag, gm } => join(&code, &tag, gm, &config),
    };
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Lines typed on stdin, read on a background thread.
fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

fn host(
    code: SessionCode,
    listen: SocketAddr,
    auto_accept: bool,
    config: &SessionConfig,
) -> Result<()> {
    let directory = StaticDirectory::new();
    let network = TcpNetwork::new(directory.clone()).with_bind_addr(listen);
    let (handle, events) = start_gm(&network, TicTacToe, code.clone(), config)?;

    let addr = directory
        .lookup(handle.endpoint())
        .map_or_else(|| listen.to_string(), |a| a.to_string());
    println!("Session code: {code}");
    println!("Players join with: peerplay join --code {code} --gm {addr} --tag <name>");
    println!("Commands: accept <tag> | reject <tag> | start | status | quit");

    let mut lines = Some(stdin_lines());
    loop {
        match events.recv_timeout(config.poll_interval) {
            Ok(event) => on_gm_event(&handle, event, auto_accept),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(input) = &lines else { continue };
        match input.try_recv() {
            Ok(line) => {
                if !host_command(&handle, line.trim()) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            // stdin closed: keep serving without host input.
            Err(TryRecvError::Disconnected) => lines = None,
        }
    }

    handle.stop();
    Ok(())
}

fn on_gm_event(handle: &GmHandle<Board>, event: GmEvent<Board>, auto_accept: bool) {
    match event {
        GmEvent::JoinRequested(participant) => {
            if auto_accept {
                if let Err(e) = handle.accept(&participant.endpoint) {
                    println!("could not accept {}: {e}", participant.tag);
                }
            } else {
                println!(
                    "{} wants to join. Type `accept {}` or `reject {}`.",
                    participant.tag, participant.tag, participant.tag
                );
            }
        }
        GmEvent::Snapshot(snapshot) => print_snapshot(&snapshot),
        GmEvent::PresenceLost => println!("warning: no longer reachable by new players"),
    }
}

/// Returns `false` when the host asked to quit.
fn host_command(handle: &GmHandle<Board>, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let result = match (words.next(), words.next()) {
        (Some("quit"), _) => return false,
        (Some("start"), _) => handle.start(),
        (Some("status"), _) => handle.snapshot().map(|s| print_snapshot(&s)),
        (Some("accept"), Some(tag)) => EndpointId::player(handle.session_code(), tag)
            .map_err(SessionError::from)
            .and_then(|endpoint| handle.accept(&endpoint))
            .map(|p| println!("{} seated as {}", p.tag, p.symbol)),
        (Some("reject"), Some(tag)) => EndpointId::player(handle.session_code(), tag)
            .map_err(SessionError::from)
            .and_then(|endpoint| handle.reject(&endpoint, None)),
        (None, _) => Ok(()),
        _ => {
            println!("unknown command: {line}");
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("error: {e}");
    }
    true
}

fn print_snapshot(snapshot: &SessionSnapshot<Board>) {
    let names = |list: &[peerplay_protocol::Participant]| {
        list.iter()
            .map(|p| format!("{} ({})", p.tag, p.symbol))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!(
        "[{}] lobby: {} | queue: {}",
        snapshot.phase,
        names(&snapshot.lobby),
        names(&snapshot.queue)
    );
    if let Some(game) = &snapshot.game {
        println!("{}", tictactoe::render(&game.board));
        if let Some(outcome) = game.outcome {
            println!("Game over: {outcome}");
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

fn join(
    code: &SessionCode,
    tag: &str,
    gm_addr: SocketAddr,
    config: &SessionConfig,
) -> Result<()> {
    let directory = StaticDirectory::new().with_entry(EndpointId::game_master(code), gm_addr);
    let network = TcpNetwork::new(directory);
    let mut player: PlayerController<Board, TcpTransport> =
        PlayerController::join(&network, code, tag, config)?;
    if let Some(error) = &player.view().error {
        println!("could not join: {error}");
        return Ok(());
    }
    println!("Join request sent to {code}; waiting for the host.");

    let lines = stdin_lines();
    loop {
        for message in player.poll_timeout(config.poll_interval) {
            show(&player, &message);
        }
        let view = player.view();
        if view.screen == Screen::GameOver {
            break;
        }
        if view.screen == Screen::PreSession {
            if let Some(error) = &view.error {
                println!("{error}");
            }
            break;
        }

        match lines.try_recv() {
            Ok(line) if line.trim() == "quit" => break,
            Ok(line) => match line.trim().parse::<usize>() {
                Ok(cell) => {
                    player.make_move(TicTacToe::place(cell));
                }
                Err(_) => println!("type a cell number 0-8, or quit"),
            },
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
    }

    player.leave();
    Ok(())
}

fn show(player: &PlayerController<Board, TcpTransport>, message: &Message<Board>) {
    match message {
        Message::JoinAccepted { participant, .. } => {
            println!("Accepted. You play {}.", participant.symbol);
        }
        Message::LobbyUpdate { lobby, .. } => {
            let names: Vec<&str> = lobby.iter().map(|p| p.tag.as_str()).collect();
            println!("Lobby: {}", names.join(", "));
        }
        Message::GameStarted { state } | Message::StateUpdate { state } => {
            println!("{}", tictactoe::render(&state.board));
            if player.is_my_turn() {
                println!("Your move (0-8):");
            }
        }
        Message::MoveResult {
            ok: false,
            error: Some(reason),
        } => println!("Move rejected: {reason}"),
        Message::PlayerDisconnected { tag, .. } => println!("{tag} disconnected."),
        Message::GameOver { state, outcome } => {
            println!("{}", tictactoe::render(&state.board));
            match outcome {
                Some(outcome) => println!("Game over: {outcome}"),
                None => println!("Game over."),
            }
        }
        Message::JoinRejected { reason } => println!("Join rejected: {reason}"),
        _ => {}
    }
}
