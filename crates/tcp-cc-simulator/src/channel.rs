//! Frame-level I/O over a reliable, ordered byte stream.
//!
//! [`FramedChannel`] wraps anything `AsyncRead + AsyncWrite` (a `TcpStream`
//! in production, a `tokio::io::duplex` pipe in tests). One call to
//! [`FramedChannel::recv`] performs exactly one transport read and hands back
//! every complete frame that read finished, which may be none at all.

use std::io;
use std::time::Duration;
use tcp_cc_abstract::{Frame, FrameDecoder, FrameError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_READ_BUFFER: usize = 1024;

pub type FrameBatch = Vec<Result<Frame, FrameError>>;

/// Outcome of a bounded wait for inbound frames.
#[derive(Debug)]
pub enum RecvOutcome {
    Frames(FrameBatch),
    TimedOut,
    /// The peer closed its side of the stream.
    Closed,
}

#[derive(Debug)]
pub struct FramedChannel<S> {
    stream: S,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, read_buffer: usize) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0; read_buffer.max(1)],
        }
    }

    /// Write a batch of frames as one contiguous buffer.
    pub async fn send(&mut self, frames: &[Frame]) -> io::Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let bytes: Vec<u8> = frames.iter().flat_map(Frame::encode).collect();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await
    }

    /// Read once. `None` means end of stream.
    pub async fn recv(&mut self) -> io::Result<Option<FrameBatch>> {
        let n = self.stream.read(&mut self.read_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.decoder.extend(&self.read_buf[..n]);
        Ok(Some(self.decoder.drain()))
    }

    /// [`Self::recv`] bounded by `limit`; expiry is a value, not an error.
    pub async fn recv_timeout(&mut self, limit: Duration) -> io::Result<RecvOutcome> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(Ok(Some(frames))) => Ok(RecvOutcome::Frames(frames)),
            Ok(Ok(None)) => Ok(RecvOutcome::Closed),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(RecvOutcome::TimedOut),
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_cross_the_pipe() {
        let (a, b) = duplex(1024);
        let mut left = FramedChannel::new(a, 64);
        let mut right = FramedChannel::new(b, 64);

        left.send(&[Frame::Packet(0), Frame::Packet(1)]).await.unwrap();
        let batch = right.recv().await.unwrap().unwrap();
        assert_eq!(batch, vec![Ok(Frame::Packet(0)), Ok(Frame::Packet(1))]);
    }

    #[tokio::test]
    async fn test_partial_frame_waits_for_next_read() {
        let (mut raw, b) = duplex(1024);
        let mut channel = FramedChannel::new(b, 64);

        raw.write_all(b"ACK 4\nAC").await.unwrap();
        let first = channel.recv().await.unwrap().unwrap();
        assert_eq!(first, vec![Ok(Frame::Ack(Some(4)))]);

        raw.write_all(b"K -1\n").await.unwrap();
        let second = channel.recv().await.unwrap().unwrap();
        assert_eq!(second, vec![Ok(Frame::Ack(None))]);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_value() {
        let (_keep_open, b) = duplex(64);
        let mut channel = FramedChannel::new(b, 64);
        let outcome = channel
            .recv_timeout(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(matches!(outcome, RecvOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_closed_peer() {
        let (a, b) = duplex(64);
        drop(a);
        let mut channel = FramedChannel::new(b, 64);
        let outcome = channel.recv_timeout(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(outcome, RecvOutcome::Closed));
    }
}
