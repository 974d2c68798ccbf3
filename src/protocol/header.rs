//! simlink frame header
//!
//! The header is a fixed 8 bytes in front of every body.

use super::{HEADER_SIZE, MAX_MESSAGE_SIZE, MessageType, PROTOCOL_VERSION};

/// Frame header (8 bytes)
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Version (2)          | Message Type  |   Reserved    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Body Length (4)                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// All fields are little-endian. The reserved byte is written as zero and
/// ignored when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    version: u16,
    msg_type: u8,
    reserved: u8,
    body_len: u32,
}

impl FrameHeader {
    /// Create a header for the current protocol version
    #[must_use]
    pub const fn new(msg_type: MessageType, body_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type.as_u8(),
            reserved: 0,
            body_len,
        }
    }

    /// Get protocol version
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Get message type byte
    #[must_use]
    pub const fn msg_type_byte(&self) -> u8 {
        self.msg_type
    }

    /// Get message type, `None` for bytes this build does not know
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    /// Get body length
    #[must_use]
    pub const fn body_len(&self) -> u32 {
        self.body_len
    }

    /// Validate version and announced length
    pub fn validate(&self) -> super::Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(super::Error::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found: self.version,
            });
        }

        if self.body_len as usize > MAX_MESSAGE_SIZE {
            return Err(super::Error::PayloadTooLarge {
                size: self.body_len as usize,
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(())
    }

    /// Convert to bytes (little-endian)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        bytes[0..2].copy_from_slice(&self.version.to_le_bytes());
        bytes[2] = self.msg_type;
        bytes[3] = self.reserved;
        bytes[4..8].copy_from_slice(&self.body_len.to_le_bytes());

        bytes
    }

    /// Parse from bytes (little-endian) and validate.
    pub fn from_bytes(bytes: &[u8]) -> super::Result<Self> {
        let Some(raw) = bytes.first_chunk::<HEADER_SIZE>() else {
            return Err(super::Error::BufferTooSmall {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        };

        let header = Self {
            version: u16::from_le_bytes([raw[0], raw[1]]),
            msg_type: raw[2],
            reserved: raw[3],
            body_len: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        };

        header.validate()?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Error;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(MessageType::Snapshot, 789);
        let bytes = header.to_bytes();
        let decoded = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.version(), PROTOCOL_VERSION);
        assert_eq!(decoded.message_type(), Some(MessageType::Snapshot));
        assert_eq!(decoded.body_len(), 789);
    }

    #[test]
    fn test_layout_is_little_endian() {
        let bytes = FrameHeader::new(MessageType::Config, 0x0102_0304).to_bytes();
        assert_eq!(bytes[0..2], PROTOCOL_VERSION.to_le_bytes());
        assert_eq!(bytes[2], 0x02);
        assert_eq!(bytes[3], 0);
        assert_eq!(bytes[4..8], [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = FrameHeader::new(MessageType::Snapshot, 0).to_bytes();
        bytes[0..2].copy_from_slice(&(PROTOCOL_VERSION + 1).to_le_bytes());

        let result = FrameHeader::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(Error::VersionMismatch { expected, found })
                if expected == PROTOCOL_VERSION && found == PROTOCOL_VERSION + 1
        ));
    }

    #[test]
    fn test_oversized_length() {
        let mut bytes = FrameHeader::new(MessageType::Snapshot, 0).to_bytes();
        let oversized = (MAX_MESSAGE_SIZE as u32) + 1;
        bytes[4..8].copy_from_slice(&oversized.to_le_bytes());

        let result = FrameHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_reserved_byte_ignored() {
        let mut bytes = FrameHeader::new(MessageType::Config, 4).to_bytes();
        bytes[3] = 0xAB;
        let decoded = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.message_type(), Some(MessageType::Config));
    }

    #[test]
    fn test_short_buffer() {
        let result = FrameHeader::from_bytes(&[1, 0, 1]);
        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { needed: 8, got: 3 })
        ));
    }
}
