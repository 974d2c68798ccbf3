//! simlink message types

use std::fmt;

/// Message types carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Periodic simulation state
    Snapshot = 0x01,
    /// Stream geometry and bitrate
    Config = 0x02,
    /// Reserved liveness probe, never emitted
    Ping = 0x03,
    /// Reserved liveness reply, never emitted
    Pong = 0x04,
}

impl MessageType {
    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Snapshot),
            0x02 => Some(Self::Config),
            0x03 => Some(Self::Ping),
            0x04 => Some(Self::Pong),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Reserved types have no behavior attached and are skipped by receivers.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Snapshot => "Snapshot",
            Self::Config => "Config",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
        };
        write!(f, "{name}")
    }
}
