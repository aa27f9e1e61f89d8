// peerplay_protocol: wire protocol for GM/player game sessions.
//
// This crate defines the identities, records, messages and framing shared by
// the Game Master (authoritative host) and its players. It is used by both
// sides through `peerplay_session` and has no dependency on any transport or
// ruleset.
//
// Module overview:
// - `types.rs`:     Participant ids, seat symbols, outcomes, `Participant`,
//                   and the board-generic `GameState<B>`.
// - `identity.rs`:  Session codes and deterministic endpoint identities
//                   (`peerplay-<CODE>-GM`, `peerplay-<CODE>-PLAYER-<tag>`).
// - `message.rs`:   The `Message<B>` vocabulary, the timestamped `Envelope`,
//                   and the JSON codec (`encode` / `decode`).
// - `framing.rs`:   Length-delimited frames for stream transports.
//
// Design decisions:
// - **JSON serialization.** Every message is one flat JSON object with a
//   kebab-case `type` tag. Unknown types decode to a dedicated error so
//   receivers can skip them instead of failing.
// - **Opaque actions.** Move payloads are `serde_json::Value`; the protocol
//   never interprets them.
// - **No async runtime.** Framing works over `std::io::Read`/`Write`.

pub mod framing;
pub mod identity;
pub mod message;
pub mod types;

pub use framing::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use identity::{EndpointId, Identity, IdentityError, Role, SessionCode};
pub use message::{CodecError, Envelope, Message, decode, encode};
pub use types::{GameState, GameStatus, Outcome, Participant, ParticipantId, Symbol};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    type Board = [Option<Symbol>; 9];

    fn code() -> SessionCode {
        SessionCode::new("ABCDEF").unwrap()
    }

    fn alice() -> Participant {
        Participant {
            id: ParticipantId(1),
            endpoint: EndpointId::player(&code(), "alice").unwrap(),
            tag: "alice".into(),
            symbol: Symbol::X,
            connected: true,
        }
    }

    fn sample_state() -> GameState<Board> {
        let mut board = [None; 9];
        board[4] = Some(Symbol::X);
        GameState {
            board,
            turn: Some(Symbol::O),
            participants: vec![alice()],
            outcome: None,
            status: GameStatus::Playing,
            session_code: code(),
        }
    }

    #[test]
    fn envelope_is_flat_with_kebab_type() {
        let bytes = encode::<Board>(Message::JoinRequest {
            tag: "alice".into(),
            endpoint: EndpointId::player(&code(), "alice").unwrap(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "join-request");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(value["tag"], "alice");
        assert_eq!(value["endpoint"], "peerplay-ABCDEF-PLAYER-alice");
    }

    #[test]
    fn state_bearing_message_survives_framed_transfer() {
        let original = Message::GameOver {
            state: sample_state(),
            outcome: Some(Outcome::Winner(Symbol::X)),
        };
        let bytes = encode(original.clone()).unwrap();

        let mut wire = Vec::new();
        write_frame(&mut wire, &bytes).unwrap();
        let received = read_frame(&mut Cursor::new(wire)).unwrap();

        let envelope: Envelope<Board> = decode(&received).unwrap();
        assert_eq!(envelope.message, original);
    }

    #[test]
    fn move_command_keeps_opaque_action() {
        let bytes = encode::<Board>(Message::MoveCommand {
            participant_id: ParticipantId(7),
            action: serde_json::json!({ "position": 4, "note": "centre" }),
        })
        .unwrap();
        let envelope: Envelope<Board> = decode(&bytes).unwrap();
        match envelope.message {
            Message::MoveCommand {
                participant_id,
                action,
            } => {
                assert_eq!(participant_id, ParticipantId(7));
                assert_eq!(action["position"], 4);
                assert_eq!(action["note"], "centre");
            }
            other => panic!("expected MoveCommand, got {other:?}"),
        }
    }

    #[test]
    fn move_result_omits_error_when_ok() {
        let bytes = encode::<Board>(Message::move_ok()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["ok"], true);
        assert!(value.get("error").is_none());

        let envelope: Envelope<Board> =
            decode(br#"{"type":"move-result","timestamp":1,"ok":false,"error":"Cell is already occupied"}"#)
                .unwrap();
        assert_eq!(envelope.timestamp, 1);
        assert_eq!(
            envelope.message,
            Message::move_failed("Cell is already occupied")
        );
    }

    #[test]
    fn unknown_type_is_distinguished_from_garbage() {
        let unknown = decode::<Board>(br#"{"type":"game-stopped","timestamp":5}"#);
        assert!(matches!(unknown, Err(CodecError::UnknownType(kind)) if kind == "game-stopped"));

        let garbage = decode::<Board>(b"not json");
        assert!(matches!(garbage, Err(CodecError::Decode(_))));

        let missing_fields = decode::<Board>(br#"{"type":"join-request","timestamp":5}"#);
        assert!(matches!(missing_fields, Err(CodecError::Decode(_))));
    }

    #[test]
    fn kind_matches_serialized_type() {
        let messages: Vec<Message<Board>> = vec![
            Message::JoinRejected {
                reason: "lobby is full".into(),
            },
            Message::PlayerDisconnected {
                participant_id: ParticipantId(2),
                tag: "bob".into(),
            },
            Message::YourTurn {
                state: sample_state(),
            },
            Message::LobbyUpdate {
                lobby: vec![alice()],
                queue: vec![],
            },
        ];
        for message in messages {
            let kind = message.kind();
            assert!(message::MESSAGE_TYPES.contains(&kind));
            let value: serde_json::Value =
                serde_json::from_slice(&encode(message).unwrap()).unwrap();
            assert_eq!(value["type"], kind);
        }
    }
}
