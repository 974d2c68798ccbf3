//! Decoded frame

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::{FrameHeader, MessageType};

/// A header plus its body, as read off the wire
#[derive(Debug, Clone)]
pub struct Frame {
    header: FrameHeader,
    body: Bytes,
}

impl Frame {
    pub(super) fn from_parts(header: FrameHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get message type, `None` if the type byte is unknown
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }

    /// Get header
    #[must_use]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Get raw body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body.
    ///
    /// The same path serves every message type; the caller picks `T` from
    /// [`Frame::message_type`].
    pub fn decode_body<T: DeserializeOwned>(&self) -> super::Result<T> {
        Ok(rmp_serde::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{StreamConfig, decode, encode};

    #[test]
    fn test_frame_body_roundtrip() {
        let config = StreamConfig::new(1280, 720, 30, 4500);
        let encoded = encode(MessageType::Config, &config).unwrap();
        let frame = decode(&encoded).unwrap();

        assert_eq!(frame.message_type(), Some(MessageType::Config));
        assert_eq!(frame.header().body_len() as usize, frame.body().len());
        assert_eq!(frame.decode_body::<StreamConfig>().unwrap(), config);
    }

    #[test]
    fn test_wrong_body_type_fails() {
        let encoded = encode(MessageType::Config, &"not a config").unwrap();
        let frame = decode(&encoded).unwrap();
        assert!(frame.decode_body::<StreamConfig>().is_err());
    }
}
