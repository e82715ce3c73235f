use bytes::{Buf, BytesMut};
use std::fmt;
use thiserror::Error;

/// Every frame on the wire ends with this byte.
pub const DELIMITER: u8 = b'\n';

/// Longest partial frame the decoder keeps around while waiting for a delimiter.
pub const MAX_FRAME_LEN: usize = 64;

/// Sequence number of a simulated packet (0-based, assigned by the sender).
pub type Seq = u64;

/// A single newline-terminated text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    /// `Packet <N>`: sender to receiver.
    Packet(Seq),
    /// `ACK <N>`: cumulative acknowledgment. `None` is encoded as `ACK -1`
    /// and means nothing has been received in order yet.
    Ack(Option<Seq>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame {line:?}")]
    Malformed { line: String },
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("partial frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversized { len: usize },
}

impl Frame {
    /// Encode the frame including its trailing delimiter.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.to_string().into_bytes();
        out.push(DELIMITER);
        out
    }

    /// Parse a single frame with the delimiter already stripped.
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(raw).map_err(|_| FrameError::NotUtf8)?;
        let malformed = || FrameError::Malformed {
            line: text.to_string(),
        };

        let mut parts = text.split_ascii_whitespace();
        let (Some(kind), Some(number), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };

        match kind {
            "Packet" => number.parse::<Seq>().map(Frame::Packet).map_err(|_| malformed()),
            "ACK" if number == "-1" => Ok(Frame::Ack(None)),
            "ACK" => number
                .parse::<Seq>()
                .map(|n| Frame::Ack(Some(n)))
                .map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Packet(seq) => write!(f, "Packet {seq}"),
            Frame::Ack(Some(seq)) => write!(f, "ACK {seq}"),
            Frame::Ack(None) => write!(f, "ACK -1"),
        }
    }
}

/// Incremental splitter for a byte stream carrying newline-delimited frames.
///
/// Bytes are appended as they arrive from the transport; complete frames are
/// handed out in order while a trailing partial frame stays buffered for the
/// next read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes of the partial frame still waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        match self.buffer.iter().position(|b| *b == DELIMITER) {
            Some(pos) => {
                let line = self.buffer.split_to(pos);
                self.buffer.advance(1);
                Some(Frame::parse(&line))
            }
            None if self.buffer.len() > MAX_FRAME_LEN => {
                let len = self.buffer.len();
                self.buffer.clear();
                Some(Err(FrameError::Oversized { len }))
            }
            None => None,
        }
    }

    /// Drain every complete frame currently buffered.
    pub fn drain(&mut self) -> Vec<Result<Frame, FrameError>> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frames() {
        assert_eq!(Frame::Packet(7).encode(), b"Packet 7\n");
        assert_eq!(Frame::Ack(Some(0)).encode(), b"ACK 0\n");
        assert_eq!(Frame::Ack(None).encode(), b"ACK -1\n");
    }

    #[test]
    fn test_parse_tolerates_carriage_return() {
        assert_eq!(Frame::parse(b"ACK 12\r"), Ok(Frame::Ack(Some(12))));
        assert_eq!(Frame::parse(b" Packet 3 "), Ok(Frame::Packet(3)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in [
            &b"Packet"[..],
            b"Packet -1",
            b"Packet 1 2",
            b"ACK -2",
            b"ACK x",
            b"NACK 3",
            b"",
        ] {
            assert!(
                matches!(Frame::parse(raw), Err(FrameError::Malformed { .. })),
                "{raw:?} should be malformed"
            );
        }
        assert_eq!(Frame::parse(&[0xff, 0xfe]), Err(FrameError::NotUtf8));
    }

    #[test]
    fn test_decoder_keeps_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"ACK 1\nACK 2\nAC");
        assert_eq!(
            decoder.drain(),
            vec![Ok(Frame::Ack(Some(1))), Ok(Frame::Ack(Some(2)))]
        );
        assert_eq!(decoder.pending(), 2);

        decoder.extend(b"K 3\n");
        assert_eq!(decoder.next_frame(), Some(Ok(Frame::Ack(Some(3)))));
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_skips_malformed_and_continues() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Packet 1\nhello\nPacket 2\n");
        let frames = decoder.drain();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Ok(Frame::Packet(1)));
        assert!(frames[1].is_err());
        assert_eq!(frames[2], Ok(Frame::Packet(2)));
    }

    #[test]
    fn test_decoder_discards_oversized_partial() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[b'x'; MAX_FRAME_LEN + 1]);
        assert_eq!(
            decoder.next_frame(),
            Some(Err(FrameError::Oversized {
                len: MAX_FRAME_LEN + 1
            }))
        );
        assert_eq!(decoder.pending(), 0);

        decoder.extend(b"Packet 9\n");
        assert_eq!(decoder.next_frame(), Some(Ok(Frame::Packet(9))));
    }
}
