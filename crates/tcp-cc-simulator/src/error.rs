use std::io;
use tcp_cc_abstract::ConfigError;
use thiserror::Error;

/// Fatal conditions for a client session. Timeouts and malformed frames are
/// handled inside the session loop and never show up here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    #[error("receiver closed the connection with {outstanding} packets unacknowledged")]
    PeerClosed { outstanding: usize },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Ends one served connection; the accept loop keeps running.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
}

/// The peer went away, as opposed to the transport failing underneath us.
pub(crate) fn is_hang_up(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
    )
}
