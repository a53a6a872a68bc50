//! Transports to the daemon.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::*;

/// A duplex byte stream to the daemon.
///
/// The session only needs to read, write and shut the stream down; anything
/// that implements the tokio I/O traits qualifies.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Acquires a transport for a socket address.
///
/// Implement this to reach the daemon through something other than a local
/// unix socket, then pass it to [`Client::connect_using`](crate::Client::connect_using).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>>;
}

/// Connects to the daemon's local stream socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixConnector;

#[async_trait]
impl Connector for UnixConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
        connect_unix(address).await
    }
}

#[cfg(unix)]
async fn connect_unix(address: &str) -> Result<Box<dyn Transport>> {
    let stream = UnixStream::connect(address)
        .await
        .map_err(|source| Error::Connect {
            address: address.to_string(),
            source,
        })?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(address: &str) -> Result<Box<dyn Transport>> {
    Err(Error::Connect {
        address: address.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix domain sockets are not supported on this platform",
        ),
    })
}
