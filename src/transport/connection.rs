//! Stream connection over either transport kind

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Ordered, reliable byte stream to a peer on the same host.
#[derive(Debug)]
pub enum Connection {
    /// Unix domain socket stream
    #[cfg(unix)]
    Unix(UnixStream),
    /// Loopback TCP stream
    Tcp(TcpStream),
}

impl Connection {
    /// Short description of the peer, for logs
    #[must_use]
    pub fn peer_label(&self) -> String {
        match self {
            #[cfg(unix)]
            Self::Unix(_) => "unix-peer".to_owned(),
            Self::Tcp(stream) => stream
                .peer_addr()
                .map_or_else(|_| "tcp-peer".to_owned(), |addr| addr.to_string()),
        }
    }

    /// Construct from a connected Unix stream
    #[cfg(unix)]
    #[must_use]
    pub fn from_unix(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }

    /// Construct from a connected TCP stream
    #[must_use]
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
