//! Transport selection: Unix domain sockets where the host has them,
//! loopback TCP where it does not.
//!
//! Both kinds surface as the same [`Listener`] / [`Connection`] pair, so the
//! publisher and subscriber never branch on the transport.

mod addr;
mod connection;
mod listener;

pub use addr::{DEFAULT_SOCKET_NAME, DEFAULT_TCP_PORT, TransportAddr};
pub use connection::Connection;
#[cfg(unix)]
pub use listener::SOCKET_MODE;
pub use listener::{Listener, create_listener, dial, remove_endpoint_artifact};
