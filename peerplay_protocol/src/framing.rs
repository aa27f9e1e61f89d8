// Length-delimited frames for stream transports.
//
// Stream transports (TCP) have no message boundaries, so each encoded
// message travels as one frame: a 4-byte big-endian length prefix followed by
// the payload bytes. Frames are payload-agnostic; `message.rs` owns the JSON
// encoding. Message-oriented transports (the in-memory network) skip framing
// entirely.
//
// `MAX_FRAME_SIZE` bounds allocation from a corrupt or hostile length
// prefix. The largest legitimate frame is a game-over or state-update
// carrying a full board and participant list, a few kilobytes at most.

use std::io::{self, Read, Write};

/// Maximum accepted frame payload (1 MiB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame too large: {} bytes (max {MAX_FRAME_SIZE})",
                    payload.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame.
///
/// Returns `UnexpectedEof` when the stream ends before or inside a frame and
/// `InvalidData` when the length prefix exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn frames_preserve_boundaries() {
        let payloads: [&[u8]; 3] = [br#"{"type":"join-request"}"#, b"", b"third"];
        let mut wire = Vec::new();
        for payload in payloads {
            write_frame(&mut wire, payload).unwrap();
        }

        let mut cursor = Cursor::new(&wire);
        for expected in payloads {
            assert_eq!(read_frame(&mut cursor).unwrap(), expected);
        }
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_write_rejected() {
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let mut wire = Vec::new();
        let err = write_frame(&mut wire, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(wire.is_empty(), "nothing written for a rejected frame");
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let mut cursor = Cursor::new((MAX_FRAME_SIZE + 1).to_be_bytes().to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_payload_is_eof() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"hello").unwrap();
        wire.truncate(wire.len() - 2);
        let err = read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
