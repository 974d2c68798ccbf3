//! Listener and dial factory for the local endpoint.

use std::io;
#[cfg(unix)]
use std::path::Path;

use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, instrument};

use super::{Connection, TransportAddr};
use crate::protocol::{Error, Result};

/// Permissions applied to the socket file. Any local user may connect: the
/// trust boundary is the machine, not the account. Do not rely on this
/// transport for isolation on shared multi-user hosts.
#[cfg(unix)]
pub const SOCKET_MODE: u32 = 0o666;

/// Bound listening endpoint.
#[derive(Debug)]
pub struct Listener {
    kind: ListenerKind,
    local_addr: TransportAddr,
}

#[derive(Debug)]
enum ListenerKind {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    /// Wait for the next incoming connection.
    pub async fn accept(&self) -> io::Result<Connection> {
        match &self.kind {
            #[cfg(unix)]
            ListenerKind::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Connection::from_unix(stream))
            }
            ListenerKind::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok(Connection::from_tcp(stream))
            }
        }
    }

    /// Address actually bound. For TCP port 0 this carries the assigned port.
    #[must_use]
    pub fn local_addr(&self) -> &TransportAddr {
        &self.local_addr
    }
}

/// Bind a listener on `addr`.
///
/// For Unix sockets a stale socket file from an unclean shutdown is removed
/// first, the parent directory is created, and the file is made
/// world-accessible ([`SOCKET_MODE`]). A non-socket file at the path is left
/// alone and reported as an error.
///
/// Must be called from within a tokio runtime.
#[instrument(level = "info", skip_all, fields(addr = %addr))]
pub fn create_listener(addr: &TransportAddr) -> Result<Listener> {
    match addr {
        TransportAddr::Unix(path) => bind_unix(path),
        TransportAddr::Tcp(socket_addr) => {
            let listener = std::net::TcpListener::bind(socket_addr)?;
            listener.set_nonblocking(true)?;
            let listener = TcpListener::from_std(listener)?;
            let local_addr = TransportAddr::Tcp(listener.local_addr()?);
            info!(addr = %local_addr, "listening");
            Ok(Listener {
                kind: ListenerKind::Tcp(listener),
                local_addr,
            })
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<Listener> {
    use std::os::unix::fs::PermissionsExt;

    clear_stale_socket(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let listener = std::os::unix::net::UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    listener.set_nonblocking(true)?;
    let listener = UnixListener::from_std(listener)?;

    info!(path = %path.display(), "listening");
    Ok(Listener {
        kind: ListenerKind::Unix(listener),
        local_addr: TransportAddr::Unix(path.to_path_buf()),
    })
}

#[cfg(not(unix))]
fn bind_unix(path: &std::path::Path) -> Result<Listener> {
    Err(Error::UnsupportedTransport(format!(
        "unix socket {} on a platform without domain sockets",
        path.display()
    )))
}

#[cfg(unix)]
fn clear_stale_socket(path: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            remove_if_present(path)
        }
        Ok(_) => Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove the socket file behind `addr`. Succeeds if it is already gone.
pub fn remove_endpoint_artifact(addr: &TransportAddr) -> Result<()> {
    match addr {
        #[cfg(unix)]
        TransportAddr::Unix(path) => clear_stale_socket(path),
        _ => Ok(()),
    }
}

/// Connect to the endpoint at `addr`.
#[instrument(level = "debug", skip_all, fields(addr = %addr))]
pub async fn dial(addr: &TransportAddr) -> Result<Connection> {
    match addr {
        #[cfg(unix)]
        TransportAddr::Unix(path) => Ok(Connection::from_unix(UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        TransportAddr::Unix(path) => Err(Error::UnsupportedTransport(format!(
            "unix socket {} on a platform without domain sockets",
            path.display()
        ))),
        TransportAddr::Tcp(socket_addr) => {
            let stream = TcpStream::connect(socket_addr).await?;
            stream.set_nodelay(true)?;
            Ok(Connection::from_tcp(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_listener_resolves_ephemeral_port() {
        let addr = TransportAddr::Tcp("127.0.0.1:0".parse::<SocketAddr>().unwrap());
        let listener = create_listener(&addr).unwrap();
        let TransportAddr::Tcp(bound) = listener.local_addr().clone() else {
            panic!("expected tcp address");
        };
        assert_ne!(bound.port(), 0);

        let bound = listener.local_addr().clone();
        let client = tokio::spawn(async move {
            let mut conn = dial(&bound).await.unwrap();
            conn.write_all(b"hi").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_without_listener_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addr = TransportAddr::Unix(tmp.path().join("missing.sock"));
        assert!(dial(&addr).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_listener_replaces_stale_socket_and_is_world_accessible() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("sim.sock");
        let addr = TransportAddr::Unix(path.clone());

        // Leave a socket file behind as an unclean exit would.
        let first = create_listener(&addr).unwrap();
        drop(first);
        assert!(path.exists());

        let listener = create_listener(&addr).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SOCKET_MODE);

        let _client = dial(&addr).await.unwrap();
        let _server = listener.accept().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_listener_refuses_to_clobber_regular_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let result = create_listener(&TransportAddr::Unix(path.clone()));
        assert!(matches!(result, Err(Error::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remove_endpoint_artifact_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addr = TransportAddr::Unix(tmp.path().join("sim.sock"));
        let listener = create_listener(&addr).unwrap();
        drop(listener);

        remove_endpoint_artifact(&addr).unwrap();
        assert!(!tmp.path().join("sim.sock").exists());
        remove_endpoint_artifact(&addr).unwrap();
    }
}
