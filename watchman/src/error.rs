use std::io;
use std::time::Duration;

/// Coarse classification of an [`Error`], cheap to copy and compare.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Io(io::ErrorKind),
    Discovery,
    Connect,
    Encode,
    Decode,
    CommandFailed,
    ResultDecode,
    ProtocolViolation,
    ConnectionClosed,
    Timeout,
    AlreadyConnected,
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
    #[error("failed to locate watchman socket: {0}")]
    Discovery(String),
    #[error("failed to connect to '{address}': {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("JSON serialization error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame from daemon: {0}")]
    Decode(String),
    #[error("watchman command failed: {0}")]
    CommandFailed(String),
    #[error("reply does not match the expected shape: {0}")]
    ResultDecode(#[source] serde_json::Error),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("client already connected")]
    AlreadyConnected,
    #[error("client not connected")]
    NotConnected,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(e) => ErrorKind::Io(e.kind()),
            Error::Discovery(_) => ErrorKind::Discovery,
            Error::Connect { .. } => ErrorKind::Connect,
            Error::Encode(_) => ErrorKind::Encode,
            Error::Decode(_) => ErrorKind::Decode,
            Error::CommandFailed(_) => ErrorKind::CommandFailed,
            Error::ResultDecode(_) => ErrorKind::ResultDecode,
            Error::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::AlreadyConnected => ErrorKind::AlreadyConnected,
            Error::NotConnected => ErrorKind::NotConnected,
        }
    }

    /// Whether this error leaves the connection unusable.
    ///
    /// A failed command or a reply that does not fit the caller's type only
    /// concerns the issuing caller; everything raised by the transport or by a
    /// loss of synchronisation with the daemon tears the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Decode(_)
                | Error::ProtocolViolation(_)
                | Error::ConnectionClosed
                | Error::Timeout(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
