//! Fixed on-wire frame header: `header ‖ payload`, all integers big-endian.

use thiserror::Error;

/// `version` field value every frame must carry.
pub const PROTO_VERSION: u8 = 1;

/// Fixed header size in bytes: version, endpoint, type, tag, length, reserved.
pub const HEADER_LEN: usize = 8;

/// Largest payload a frame may carry; length field is 16 bits.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Logical destination within the protocol. Not a network endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Authentication,
    PixelData,
    MulticastControl,
}

impl Endpoint {
    fn to_wire(self) -> u8 {
        match self {
            Endpoint::Authentication => 0,
            Endpoint::PixelData => 1,
            Endpoint::MulticastControl => 2,
        }
    }

    fn from_wire(b: u8) -> Result<Self, HeaderError> {
        match b {
            0 => Ok(Endpoint::Authentication),
            1 => Ok(Endpoint::PixelData),
            2 => Ok(Endpoint::MulticastControl),
            other => Err(HeaderError::UnknownEndpoint(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("unsupported protocol version {0}, expected {PROTO_VERSION}")]
    UnsupportedVersion(u8),
    #[error("unknown endpoint id {0}")]
    UnknownEndpoint(u8),
    #[error("header too short: got {0} bytes, need {HEADER_LEN}")]
    TooShort(usize),
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit")]
    PayloadTooLarge(usize),
}

/// Fixed message-frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub endpoint: Endpoint,
    pub message_type: u8,
    pub tag: u8,
    pub length: u16,
}

impl MessageHeader {
    pub fn new(endpoint: Endpoint, message_type: u8, tag: u8, length: u16) -> Self {
        Self { endpoint, message_type, tag, length }
    }

    /// Encode into the fixed 8-byte wire layout. Reserved bytes are zero.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = PROTO_VERSION;
        buf[1] = self.endpoint.to_wire();
        buf[2] = self.message_type;
        buf[3] = self.tag;
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        // buf[6..8] reserved, left zero
        buf
    }

    /// Decode from exactly `HEADER_LEN` bytes, validating `version`.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_LEN {
            return Err(HeaderError::TooShort(buf.len()));
        }
        let version = buf[0];
        if version != PROTO_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let endpoint = Endpoint::from_wire(buf[1])?;
        let message_type = buf[2];
        let tag = buf[3];
        let length = u16::from_be_bytes([buf[4], buf[5]]);
        Ok(Self { endpoint, message_type, tag, length })
    }
}

/// Validate a payload length against the frame limit before sending.
pub fn check_payload_len(len: usize) -> Result<u16, HeaderError> {
    if len > MAX_PAYLOAD_LEN {
        return Err(HeaderError::PayloadTooLarge(len));
    }
    Ok(len as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let hdr = MessageHeader::new(Endpoint::PixelData, 4, 0xAB, 450);
        let encoded = hdr.encode();
        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(hdr, decoded);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = MessageHeader::new(Endpoint::Authentication, 0, 0, 0).encode();
        buf[0] = 7;
        assert!(matches!(
            MessageHeader::decode(&buf),
            Err(HeaderError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn rejects_short_header() {
        assert!(matches!(MessageHeader::decode(&[1, 2, 3]), Err(HeaderError::TooShort(3))));
    }

    #[test]
    fn max_payload_accepted_oversize_rejected() {
        assert_eq!(check_payload_len(MAX_PAYLOAD_LEN).unwrap(), u16::MAX);
        assert!(matches!(
            check_payload_len(MAX_PAYLOAD_LEN + 1),
            Err(HeaderError::PayloadTooLarge(_))
        ));
    }
}
