//! Local endpoint addresses.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::protocol::Error;

/// Default loopback port on hosts without Unix domain sockets
pub const DEFAULT_TCP_PORT: u16 = 9470;

/// Default socket file name, placed in the system temp directory
pub const DEFAULT_SOCKET_NAME: &str = "simlink.sock";

/// Where the publisher listens and the subscriber dials.
///
/// Text form is `unix:<path>` or `tcp:<host:port>`. Parsing also accepts a
/// bare socket address (`127.0.0.1:9470`) or a bare path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportAddr {
    /// Unix domain socket at a filesystem path
    Unix(PathBuf),
    /// Loopback TCP
    Tcp(SocketAddr),
}

impl TransportAddr {
    /// Socket file backing this address, if any
    #[must_use]
    pub fn socket_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }
}

impl Default for TransportAddr {
    fn default() -> Self {
        if cfg!(unix) {
            Self::Unix(std::env::temp_dir().join(DEFAULT_SOCKET_NAME))
        } else {
            Self::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)))
        }
    }
}

impl fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl FromStr for TransportAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(Error::InvalidAddress(s.into()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return addr
                .parse()
                .map(Self::Tcp)
                .map_err(|e| Error::InvalidAddress(format!("{s}: {e}")));
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::Tcp(addr));
        }
        Ok(Self::Unix(PathBuf::from(s)))
    }
}

impl From<SocketAddr> for TransportAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::Tcp(addr)
    }
}

impl From<PathBuf> for TransportAddr {
    fn from(path: PathBuf) -> Self {
        Self::Unix(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(
            "unix:/tmp/a.sock".parse::<TransportAddr>().unwrap(),
            TransportAddr::Unix(PathBuf::from("/tmp/a.sock"))
        );
        assert_eq!(
            "tcp:127.0.0.1:9000".parse::<TransportAddr>().unwrap(),
            TransportAddr::Tcp("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_bare() {
        assert!(matches!(
            "127.0.0.1:1234".parse::<TransportAddr>().unwrap(),
            TransportAddr::Tcp(_)
        ));
        assert!(matches!(
            "/run/sim.sock".parse::<TransportAddr>().unwrap(),
            TransportAddr::Unix(_)
        ));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<TransportAddr>().is_err());
        assert!("unix:".parse::<TransportAddr>().is_err());
        assert!("tcp:not-an-addr".parse::<TransportAddr>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["unix:/tmp/x.sock", "tcp:127.0.0.1:80"] {
            let addr: TransportAddr = text.parse().unwrap();
            assert_eq!(addr.to_string(), text);
        }
    }

    #[test]
    fn test_default_matches_platform() {
        let addr = TransportAddr::default();
        if cfg!(unix) {
            assert!(addr.socket_path().unwrap().ends_with(DEFAULT_SOCKET_NAME));
        } else {
            assert!(matches!(addr, TransportAddr::Tcp(a) if a.port() == DEFAULT_TCP_PORT));
        }
    }
}
