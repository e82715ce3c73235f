//! Client-side session driver.
//!
//! Each round the driver sends as many new packets as the congestion window
//! allows, then waits for that many packets to be cumulatively acknowledged.
//! Every wait is bounded by the adaptive retransmission timeout; expiry hands
//! control to the controller's timeout path and ends the round.

use std::time::Instant;
use tcp_cc_abstract::{ClientConfig, Frame, Seq};
use tcp_cc_core::{AckEvent, SenderState};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::channel::{FrameBatch, FramedChannel, RecvOutcome};
use crate::error::SessionError;
use crate::trace::{SessionReport, WindowSample};

pub struct Session<S> {
    config: ClientConfig,
    channel: FramedChannel<S>,
    state: SenderState,
    rounds: u64,
    malformed_frames: u64,
    window_trace: Vec<WindowSample>,
    rtt_samples: Vec<f64>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(config: ClientConfig, stream: S) -> Result<Self, SessionError> {
        config.validate()?;
        let state = SenderState::from_config(&config);
        let channel = FramedChannel::new(stream, config.read_buffer);
        Ok(Self {
            config,
            channel,
            state,
            rounds: 0,
            malformed_frames: 0,
            window_trace: Vec::new(),
            rtt_samples: Vec::new(),
        })
    }

    /// Drive the session until every packet is acknowledged.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        let started = Instant::now();
        info!(
            variant = %self.config.variant,
            max_packets = self.config.max_packets,
            "starting session"
        );

        let result = self.drive().await;
        // Best effort: the receiver treats a half-closed stream as end of session.
        if let Err(e) = self.channel.shutdown().await {
            debug!(error = %e, "shutdown after session");
        }
        result?;

        let report = self.report(started);
        info!(
            rounds = report.rounds,
            retransmissions = report.retransmissions,
            timeouts = report.timeouts,
            elapsed_secs = report.elapsed_secs,
            "session complete"
        );
        Ok(report)
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        while !self.state.is_complete() {
            self.rounds += 1;
            let controller = self.state.controller();
            self.window_trace.push(WindowSample {
                round: self.rounds,
                cwnd: controller.cwnd(),
                ssthresh: controller.ssthresh(),
            });
            info!(
                round = self.rounds,
                "CWND:{} SSTHRESH:{}",
                controller.cwnd(),
                controller.ssthresh()
            );

            let window = self.state.round_window();
            self.send_new(window).await?;
            self.await_round(window).await?;
        }
        Ok(())
    }

    async fn send_new(&mut self, window: u64) -> Result<(), SessionError> {
        if window == 0 {
            return Ok(());
        }
        let now = Instant::now();
        let frames: Vec<Frame> = (0..window)
            .map(|_| Frame::Packet(self.state.record_send(now)))
            .collect();
        self.channel.send(&frames).await?;
        debug!(
            first = self.state.next_seq() - window,
            last = self.state.next_seq() - 1,
            "sent packets"
        );
        Ok(())
    }

    /// Wait until `window` packets are newly acknowledged, nothing is
    /// outstanding, or the timeout fires. A window of zero waits for the
    /// outstanding tail alone.
    async fn await_round(&mut self, window: u64) -> Result<(), SessionError> {
        let mut acked = 0u64;
        while !self.state.unacked().is_empty() && (window == 0 || acked < window) {
            let limit = self.state.rtt().timeout_duration();
            match self.channel.recv_timeout(limit).await? {
                RecvOutcome::Frames(batch) => {
                    acked += self.handle_batch(batch).await?;
                }
                RecvOutcome::TimedOut => {
                    warn!(
                        timeout = self.state.rtt().timeout(),
                        outstanding = self.state.unacked().len(),
                        "timeout occurred, retransmitting and adjusting congestion window"
                    );
                    let reaction = self.state.on_timeout();
                    self.retransmit(&reaction.retransmit).await?;
                    break;
                }
                RecvOutcome::Closed => {
                    return Err(SessionError::PeerClosed {
                        outstanding: self.state.unacked().len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Process every frame from one read; returns how many packets became acknowledged.
    async fn handle_batch(&mut self, batch: FrameBatch) -> Result<u64, SessionError> {
        let received_at = Instant::now();
        let mut acked = 0;
        for frame in batch {
            match frame {
                Ok(Frame::Ack(ack)) => match self.state.on_ack(ack, received_at) {
                    AckEvent::New {
                        newly_acked,
                        rtt_sample,
                        ..
                    } => {
                        acked += newly_acked;
                        self.rtt_samples.extend(rtt_sample);
                    }
                    AckEvent::Duplicate { reaction, .. } => {
                        self.retransmit(&reaction.retransmit).await?;
                    }
                    AckEvent::Ignored => {}
                },
                Ok(other) => {
                    warn!(frame = %other, "unexpected frame from receiver");
                    self.malformed_frames += 1;
                }
                Err(e) => {
                    warn!(error = %e, "discarding malformed frame");
                    self.malformed_frames += 1;
                }
            }
        }
        Ok(acked)
    }

    async fn retransmit(&mut self, seqs: &[Seq]) -> Result<(), SessionError> {
        if seqs.is_empty() {
            return Ok(());
        }
        let frames: Vec<Frame> = seqs.iter().map(|seq| Frame::Packet(*seq)).collect();
        self.channel.send(&frames).await?;
        let now = Instant::now();
        for seq in seqs {
            self.state.record_retransmit(*seq, now);
            info!(seq, "Retransmitted: Packet {seq}");
        }
        Ok(())
    }

    fn report(&self, started: Instant) -> SessionReport {
        let stats = self.state.stats();
        let controller = self.state.controller();
        SessionReport {
            variant: controller.variant(),
            max_packets: self.state.max_packets(),
            completed: self.state.is_complete(),
            packets_sent: self.state.next_seq(),
            transmissions: stats.transmissions,
            retransmissions: stats.retransmissions,
            new_acks: stats.new_acks,
            duplicate_acks: stats.duplicate_acks,
            ignored_acks: stats.ignored_acks,
            malformed_frames: self.malformed_frames,
            fast_recoveries: stats.fast_recoveries,
            timeouts: stats.timeouts,
            rounds: self.rounds,
            elapsed_secs: started.elapsed().as_secs_f64(),
            final_cwnd: controller.cwnd(),
            final_ssthresh: controller.ssthresh(),
            final_timeout: self.state.rtt().timeout(),
            window_trace: self.window_trace.clone(),
            rtt_samples: self.rtt_samples.clone(),
        }
    }
}

/// Connect to the configured receiver and run one session over TCP.
pub async fn run_client(config: ClientConfig) -> Result<SessionReport, SessionError> {
    config.validate()?;
    let addr = config.server_endpoint();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| SessionError::Connect {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    info!(%addr, "connected to server");
    Session::new(config, stream)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tcp_cc_abstract::Variant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn config(max_packets: u64) -> ClientConfig {
        let mut config = ClientConfig {
            max_packets,
            ..Default::default()
        };
        config.rtt.initial_timeout = 0.2;
        config
    }

    /// Receiver that acknowledges every packet in order and never loses anything.
    async fn echo_acks(mut stream: tokio::io::DuplexStream) {
        let mut buf = vec![0u8; 1024];
        let mut pending = Vec::new();
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            pending.extend_from_slice(&buf[..n]);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Ok(Frame::Packet(seq)) = Frame::parse(&line[..line.len() - 1]) {
                    if stream.write_all(&Frame::Ack(Some(seq)).encode()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_lossless_session_completes() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(echo_acks(server));

        let report = Session::new(config(10), client).unwrap().run().await.unwrap();
        assert!(report.completed);
        assert_eq!(report.packets_sent, 10);
        assert_eq!(report.transmissions, 10);
        assert_eq!(report.new_acks, 10);
        assert_eq!(report.retransmissions, 0);
        assert_eq!(report.rtt_samples.len(), 10);
        assert_eq!(report.window_trace[0].cwnd, 1.0);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_and_retransmits_earliest() {
        let (client, mut server) = duplex(64 * 1024);
        let peer = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut buf = [0u8; 256];
            // Swallow the first transmission, acknowledge only after the retransmission.
            while !seen.ends_with(b"Packet 0\nPacket 0\n") {
                let n = server.read(&mut buf).await.unwrap();
                assert!(n > 0, "client hung up early");
                seen.extend_from_slice(&buf[..n]);
            }
            server.write_all(b"ACK 0\n").await.unwrap();
            seen
        });

        let report = Session::new(config(1), client).unwrap().run().await.unwrap();
        let seen = peer.await.unwrap();

        assert_eq!(seen, b"Packet 0\nPacket 0\n");
        assert!(report.completed);
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.retransmissions, 1);
        assert!(report.rtt_samples.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let (client, mut server) = duplex(64 * 1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await;
            server
                .write_all(b"garbage\nACK zero\nACK 0\n")
                .await
                .unwrap();
            let _ = server.read(&mut buf).await;
        });

        let report = Session::new(config(1), client).unwrap().run().await.unwrap();
        assert!(report.completed);
        assert_eq!(report.malformed_frames, 2);
    }

    #[tokio::test]
    async fn test_peer_hang_up_is_fatal() {
        let (client, server) = duplex(1024);
        drop(server);
        let err = Session::new(config(5), client)
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(_) | SessionError::PeerClosed { .. }
        ));
    }

    #[tokio::test]
    async fn test_cubic_session_completes() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(echo_acks(server));

        let mut cfg = config(50);
        cfg.variant = Variant::Cubic;
        cfg.initial_ssthresh = 4.0;
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            Session::new(cfg, client).unwrap().run(),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(report.completed);
        assert_eq!(report.variant, Variant::Cubic);
        assert!(report.final_cwnd >= 10.0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (client, _server) = duplex(64);
        let cfg = ClientConfig {
            max_packets: 0,
            ..Default::default()
        };
        assert!(matches!(
            Session::new(cfg, client),
            Err(SessionError::Config(_))
        ));
    }
}
