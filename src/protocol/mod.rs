//! simlink wire protocol
//!
//! This module provides the frame format, message types, payload schema and
//! codec shared by the publisher and the subscriber.

mod codec;
mod error;
mod header;
mod message;
pub mod payload;
mod types;

pub use codec::{decode, encode, encode_empty, read_frame, write_frame};
pub use error::{Error, Result};
pub use header::FrameHeader;
pub use message::Frame;
pub use payload::{SnapshotPayload, StreamConfig};
pub use types::MessageType;

/// Wire protocol version. Peers must match exactly.
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum body size (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Header size in bytes
pub const HEADER_SIZE: usize = 8;
