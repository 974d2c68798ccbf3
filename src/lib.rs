//! simlink - Local snapshot streaming between a simulation and its renderers
//!
//! A [`Publisher`] inside the simulation process accepts any number of local
//! consumers and pushes each world snapshot to all of them. A [`Subscriber`]
//! in the consumer process holds one connection, reconnects when it drops,
//! and always exposes the newest snapshot.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use simlink::{Publisher, PublisherConfig, SnapshotPayload, Subscriber, SubscriberConfig};
//!
//! # async fn run() -> simlink::Result<()> {
//! let publisher = Publisher::new(PublisherConfig::default());
//! publisher.start().await?;
//!
//! let subscriber = Subscriber::new(SubscriberConfig::default());
//! subscriber.start().await;
//!
//! publisher.publish_snapshot(SnapshotPayload::default());
//!
//! if let Some(snapshot) = subscriber.latest_snapshot() {
//!     println!("tick {}", snapshot.tick);
//! }
//!
//! subscriber.stop().await;
//! publisher.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Length-prefixed framing** - 8-byte little-endian header, `MessagePack` body
//! - **Drop-oldest delivery** - a slow consumer never stalls the simulation
//! - **Local transports** - Unix domain sockets, loopback TCP elsewhere
//! - **Bounded reconnect** - fixed delay with an optional attempt budget

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod adapter;
pub mod metrics;
pub mod protocol;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use metrics::{PublisherStats, SubscriberStats};
pub use protocol::{
    Error, Frame, FrameHeader, HEADER_SIZE, MAX_MESSAGE_SIZE, MessageType, PROTOCOL_VERSION,
    Result, SnapshotPayload, StreamConfig,
};
pub use publisher::{Publisher, PublisherConfig};
pub use subscriber::{ConnectionState, Subscriber, SubscriberConfig, SubscriberHandler};
pub use transport::TransportAddr;
