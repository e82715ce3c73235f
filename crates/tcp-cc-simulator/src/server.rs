//! Receiver side: accept loop plus one worker task per connection.
//!
//! Each worker owns its [`Receiver`] (ACK engine and loss model); nothing is
//! shared between connections, so flows run concurrently without locking.

use std::net::SocketAddr;
use std::time::Duration;
use tcp_cc_abstract::{Frame, ServerConfig};
use tcp_cc_core::{Receiver, loss_model_for};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{DEFAULT_READ_BUFFER, FramedChannel};
use crate::error::{ConnectionError, ServerError, is_hang_up};
use crate::trace::ConnectionSummary;

pub type ConnectionHandle = JoinHandle<Result<ConnectionSummary, ConnectionError>>;

pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    accepted: u64,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(
            %addr,
            loss_rate = config.loss_rate,
            "server listening"
        );
        Ok(Self {
            config,
            listener,
            accepted: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection and hand it to its own worker task.
    pub async fn accept(&mut self) -> Result<(SocketAddr, ConnectionHandle), ServerError> {
        let (stream, peer) = self.listener.accept().await.map_err(ServerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not disable Nagle");
        }

        let index = self.accepted;
        self.accepted += 1;
        let receiver = Receiver::new(loss_model_for(&self.config, index));
        info!(%peer, connection = index, "accepted connection");

        let handle = tokio::spawn(async move {
            let result = serve_connection(stream, peer.to_string(), receiver).await;
            match &result {
                Ok(summary) => info!(
                    %peer,
                    received = summary.packets_received,
                    dropped = summary.packets_dropped,
                    acks = summary.acks_sent,
                    highest = ?summary.highest_consecutive,
                    "client socket closed"
                ),
                Err(e) => error!(%peer, error = %e, "connection failed"),
            }
            result
        });
        Ok((peer, handle))
    }

    /// Serve connections forever. Returns the last error once
    /// [`MAX_ACCEPT_FAILURES`] accepts in a row have failed.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut backoff = AcceptBackoff::default();
        loop {
            match self.accept().await {
                Ok(_) => backoff.reset(),
                Err(e) => match backoff.on_failure() {
                    Some(delay) => {
                        warn!(error = %e, retry_in = ?delay, "accept failed");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(error = %e, "accept keeps failing, giving up");
                        return Err(e);
                    }
                },
            }
        }
    }
}

pub const MAX_ACCEPT_FAILURES: u32 = 8;
const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(2);

/// Delay between failed accepts, doubling up to a cap.
#[derive(Debug, Default)]
struct AcceptBackoff {
    failures: u32,
}

impl AcceptBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    /// `None` once the failure budget is spent.
    fn on_failure(&mut self) -> Option<Duration> {
        if self.failures >= MAX_ACCEPT_FAILURES {
            return None;
        }
        let delay = INITIAL_ACCEPT_BACKOFF
            .saturating_mul(1 << self.failures)
            .min(MAX_ACCEPT_BACKOFF);
        self.failures += 1;
        Some(delay)
    }
}

/// Run the receive loop for one connection until the peer closes it.
pub async fn serve_connection<S>(
    stream: S,
    peer: String,
    mut receiver: Receiver,
) -> Result<ConnectionSummary, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = FramedChannel::new(stream, DEFAULT_READ_BUFFER);

    loop {
        let batch = match channel.recv().await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) if is_hang_up(&e) => {
                debug!(%peer, error = %e, "peer hung up");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let mut replies = Vec::new();
        for frame in batch {
            match frame {
                Ok(Frame::Packet(seq)) => replies.extend(receiver.on_packet(seq)),
                Ok(other) => {
                    warn!(%peer, frame = %other, "unexpected frame from sender");
                    receiver.note_malformed();
                }
                Err(e) => {
                    error!(%peer, error = %e, "error parsing packet data");
                    receiver.note_malformed();
                }
            }
        }

        match channel.send(&replies).await {
            Ok(()) => {}
            Err(e) if is_hang_up(&e) => {
                debug!(%peer, error = %e, "peer hung up before ACKs were written");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let stats = receiver.stats();
    Ok(ConnectionSummary {
        peer,
        packets_received: stats.packets_received,
        packets_dropped: stats.packets_dropped,
        malformed_frames: stats.malformed_frames,
        acks_sent: stats.acks_sent,
        duplicate_acks_sent: stats.duplicate_acks_sent,
        highest_consecutive: receiver.engine().highest_consecutive(),
    })
}
