//! Codec B: zero-copy structural layer for the multicast datagram header,
//! the decrypted sync-output frame, and the MulticastControl payloads
//! (`MCC_GET_KEY`, `MCC_GET_KEY_ACK`, `MCC_REKEY`, `MCC_REKEY_ACK`,
//! `MCC_GET_INFO`, `MCC_GET_INFO_ACK`). Fixed fields are reinterpreted
//! directly out of the buffer; the key/iv/address trailing fields are
//! length-prefixed raw bytes immediately after the fixed header.

use thiserror::Error;
use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::messages::{KeyWrapper, MccGetInfo, MccGetInfoAck, MccGetKey, MccGetKeyAck, MccRekey, MccRekeyAck};

/// On-wire multicast datagram header, preceding the AEAD ciphertext+tag.
/// 16 bytes: key id, per-packet sequence (completes the 96-bit AEAD nonce
/// together with the per-key 16-byte seed from the keystore), payload
/// length.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct McastHeader {
    pub key_id: U32<BigEndian>,
    pub sequence: U64<BigEndian>,
    pub payload_len: U32<BigEndian>,
}

pub const MCAST_HEADER_LEN: usize = std::mem::size_of::<McastHeader>();

#[derive(Debug, Error)]
pub enum McastCodecError {
    #[error("multicast datagram of {0} bytes is shorter than the {MCAST_HEADER_LEN}-byte header")]
    TooShort(usize),
    #[error("multicast header declares payload_len {declared} but only {available} ciphertext bytes follow")]
    LengthMismatch { declared: u32, available: usize },
    #[error("sync-output frame of {0} bytes is shorter than its 4-byte channel field")]
    SyncOutputTooShort(usize),
    #[error("sync-output pixel payload length {0} is not a multiple of 4 (packed 0xWWRRGGBB words)")]
    UnalignedPixelWords(usize),
    #[error("multicast control payload of {0} bytes is shorter than its fixed header")]
    ControlTooShort(usize),
    #[error("multicast control payload declares a trailing field of {declared} bytes but only {available} remain")]
    ControlFieldTooShort { declared: u32, available: usize },
    #[error("{0} bytes left over after decoding a multicast control payload")]
    ControlTrailingBytes(usize),
    #[error("address field is not valid UTF-8: {0}")]
    AddressNotUtf8(std::string::FromUtf8Error),
}

/// Borrowed view of an inbound multicast datagram: the structural header,
/// plus the ciphertext+tag slice it describes.
pub struct McastDatagram<'a> {
    pub header: McastHeader,
    pub ciphertext: &'a [u8],
}

pub fn parse_datagram(buf: &[u8]) -> Result<McastDatagram<'_>, McastCodecError> {
    if buf.len() < MCAST_HEADER_LEN {
        return Err(McastCodecError::TooShort(buf.len()));
    }
    let (header_bytes, rest) = buf.split_at(MCAST_HEADER_LEN);
    let header = McastHeader::read_from_bytes(header_bytes)
        .expect("slice length matches MCAST_HEADER_LEN");
    let declared = header.payload_len.get() as usize;
    if declared > rest.len() {
        return Err(McastCodecError::LengthMismatch { declared: header.payload_len.get(), available: rest.len() });
    }
    Ok(McastDatagram { header, ciphertext: &rest[..declared] })
}

/// Decrypted sync-output frame: channel id followed by packed
/// `0xWWRRGGBB` pixel words, forwarded to the channel's `updatePixels`
/// unchanged (pixel rendering/unpacking is out of scope here).
pub struct McastDataSyncOutput<'a> {
    pub channel: u32,
    pub pixel_words: &'a [u8],
}

pub fn parse_sync_output(plaintext: &[u8]) -> Result<McastDataSyncOutput<'_>, McastCodecError> {
    if plaintext.len() < 4 {
        return Err(McastCodecError::SyncOutputTooShort(plaintext.len()));
    }
    let (channel_bytes, pixel_words) = plaintext.split_at(4);
    let channel = U32::<BigEndian>::read_from_bytes(channel_bytes)
        .expect("slice length is exactly 4")
        .get();
    if pixel_words.len() % 4 != 0 {
        return Err(McastCodecError::UnalignedPixelWords(pixel_words.len()));
    }
    Ok(McastDataSyncOutput { channel, pixel_words })
}

// ---------------------------------------------------------------------------
// Multicast control payloads: fixed zerocopy header + trailing raw bytes for
// the variable-length fields (key, iv, address), the same split already used
// above for the datagram header and its ciphertext tail.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct GetKeyWire {
    key_id: U32<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct GetKeyAckHeaderWire {
    status: u8,
    key_id: U32<BigEndian>,
    key_type: U32<BigEndian>,
    key_len: U32<BigEndian>,
    iv_len: U32<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RekeyHeaderWire {
    key_id: U32<BigEndian>,
    key_type: U32<BigEndian>,
    key_len: U32<BigEndian>,
    iv_len: U32<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RekeyAckWire {
    status: u8,
    key_id: U32<BigEndian>,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct GetInfoAckHeaderWire {
    status: u8,
    port: U16<BigEndian>,
    key_id: U32<BigEndian>,
    addr_len: U32<BigEndian>,
}

/// Split a trailing length-prefixed field off `rest`, checking it is
/// actually present.
fn take_field<'a>(rest: &'a [u8], declared: u32) -> Result<(&'a [u8], &'a [u8]), McastCodecError> {
    let declared = declared as usize;
    if declared > rest.len() {
        return Err(McastCodecError::ControlFieldTooShort { declared: declared as u32, available: rest.len() });
    }
    Ok(rest.split_at(declared))
}

pub fn encode_get_key(msg: &MccGetKey) -> Vec<u8> {
    GetKeyWire { key_id: U32::new(msg.key_id) }.as_bytes().to_vec()
}

pub fn decode_get_key(buf: &[u8]) -> Result<MccGetKey, McastCodecError> {
    let wire = GetKeyWire::read_from_bytes(buf).map_err(|_| McastCodecError::ControlTooShort(buf.len()))?;
    Ok(MccGetKey { key_id: wire.key_id.get() })
}

pub fn encode_get_key_ack(msg: &MccGetKeyAck) -> Vec<u8> {
    let header = GetKeyAckHeaderWire {
        status: msg.status,
        key_id: U32::new(msg.key_id),
        key_type: U32::new(msg.key.key_type),
        key_len: U32::new(msg.key.key.len() as u32),
        iv_len: U32::new(msg.key.iv.len() as u32),
    };
    let mut buf = header.as_bytes().to_vec();
    buf.extend_from_slice(&msg.key.key);
    buf.extend_from_slice(&msg.key.iv);
    buf
}

pub fn decode_get_key_ack(buf: &[u8]) -> Result<MccGetKeyAck, McastCodecError> {
    const HEADER_LEN: usize = std::mem::size_of::<GetKeyAckHeaderWire>();
    if buf.len() < HEADER_LEN {
        return Err(McastCodecError::ControlTooShort(buf.len()));
    }
    let (header_bytes, rest) = buf.split_at(HEADER_LEN);
    let header = GetKeyAckHeaderWire::read_from_bytes(header_bytes).expect("slice length matches HEADER_LEN");
    let (key, rest) = take_field(rest, header.key_len.get())?;
    let (iv, rest) = take_field(rest, header.iv_len.get())?;
    if !rest.is_empty() {
        return Err(McastCodecError::ControlTrailingBytes(rest.len()));
    }
    Ok(MccGetKeyAck {
        status: header.status,
        key_id: header.key_id.get(),
        key: KeyWrapper { key_type: header.key_type.get(), key: key.to_vec(), iv: iv.to_vec() },
    })
}

pub fn encode_rekey(msg: &MccRekey) -> Vec<u8> {
    let header = RekeyHeaderWire {
        key_id: U32::new(msg.key_id),
        key_type: U32::new(msg.key.key_type),
        key_len: U32::new(msg.key.key.len() as u32),
        iv_len: U32::new(msg.key.iv.len() as u32),
    };
    let mut buf = header.as_bytes().to_vec();
    buf.extend_from_slice(&msg.key.key);
    buf.extend_from_slice(&msg.key.iv);
    buf
}

pub fn decode_rekey(buf: &[u8]) -> Result<MccRekey, McastCodecError> {
    const HEADER_LEN: usize = std::mem::size_of::<RekeyHeaderWire>();
    if buf.len() < HEADER_LEN {
        return Err(McastCodecError::ControlTooShort(buf.len()));
    }
    let (header_bytes, rest) = buf.split_at(HEADER_LEN);
    let header = RekeyHeaderWire::read_from_bytes(header_bytes).expect("slice length matches HEADER_LEN");
    let (key, rest) = take_field(rest, header.key_len.get())?;
    let (iv, rest) = take_field(rest, header.iv_len.get())?;
    if !rest.is_empty() {
        return Err(McastCodecError::ControlTrailingBytes(rest.len()));
    }
    Ok(MccRekey {
        key_id: header.key_id.get(),
        key: KeyWrapper { key_type: header.key_type.get(), key: key.to_vec(), iv: iv.to_vec() },
    })
}

pub fn encode_rekey_ack(msg: &MccRekeyAck) -> Vec<u8> {
    RekeyAckWire { status: msg.status, key_id: U32::new(msg.key_id) }.as_bytes().to_vec()
}

pub fn decode_rekey_ack(buf: &[u8]) -> Result<MccRekeyAck, McastCodecError> {
    let wire = RekeyAckWire::read_from_bytes(buf).map_err(|_| McastCodecError::ControlTooShort(buf.len()))?;
    Ok(MccRekeyAck { status: wire.status, key_id: wire.key_id.get() })
}

pub fn encode_get_info(_msg: &MccGetInfo) -> Vec<u8> {
    Vec::new()
}

pub fn decode_get_info(buf: &[u8]) -> Result<MccGetInfo, McastCodecError> {
    if !buf.is_empty() {
        return Err(McastCodecError::ControlTrailingBytes(buf.len()));
    }
    Ok(MccGetInfo)
}

pub fn encode_get_info_ack(msg: &MccGetInfoAck) -> Vec<u8> {
    let header = GetInfoAckHeaderWire {
        status: msg.status,
        port: U16::new(msg.port),
        key_id: U32::new(msg.key_id),
        addr_len: U32::new(msg.address.len() as u32),
    };
    let mut buf = header.as_bytes().to_vec();
    buf.extend_from_slice(msg.address.as_bytes());
    buf
}

pub fn decode_get_info_ack(buf: &[u8]) -> Result<MccGetInfoAck, McastCodecError> {
    const HEADER_LEN: usize = std::mem::size_of::<GetInfoAckHeaderWire>();
    if buf.len() < HEADER_LEN {
        return Err(McastCodecError::ControlTooShort(buf.len()));
    }
    let (header_bytes, rest) = buf.split_at(HEADER_LEN);
    let header = GetInfoAckHeaderWire::read_from_bytes(header_bytes).expect("slice length matches HEADER_LEN");
    let (addr_bytes, rest) = take_field(rest, header.addr_len.get())?;
    if !rest.is_empty() {
        return Err(McastCodecError::ControlTrailingBytes(rest.len()));
    }
    let address = String::from_utf8(addr_bytes.to_vec()).map_err(McastCodecError::AddressNotUtf8)?;
    Ok(MccGetInfoAck { status: header.status, address, port: header.port.get(), key_id: header.key_id.get() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::messages::MCC_KEY_TYPE_CHACHA20_POLY1305;

    #[test]
    fn parses_well_formed_datagram() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&7u64.to_be_bytes());
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[9, 9, 9, 9]);

        let datagram = parse_datagram(&buf).unwrap();
        assert_eq!(datagram.header.key_id.get(), 1);
        assert_eq!(datagram.header.sequence.get(), 7);
        assert_eq!(datagram.ciphertext, &[9, 9, 9, 9]);
    }

    #[test]
    fn rejects_short_datagram() {
        assert!(matches!(parse_datagram(&[0u8; 4]), Err(McastCodecError::TooShort(4))));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&0u64.to_be_bytes());
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(parse_datagram(&buf), Err(McastCodecError::LengthMismatch { .. })));
    }

    #[test]
    fn parses_sync_output() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(&[0xFF, 0, 0, 0]);
        let frame = parse_sync_output(&buf).unwrap();
        assert_eq!(frame.channel, 5);
        assert_eq!(frame.pixel_words, &[0xFF, 0, 0, 0]);
    }

    #[test]
    fn rejects_unaligned_pixel_words() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(&[0xFF, 0, 0]);
        assert!(matches!(parse_sync_output(&buf), Err(McastCodecError::UnalignedPixelWords(3))));
    }

    #[test]
    fn get_key_round_trips() {
        let msg = MccGetKey { key_id: 0xABCD };
        let bytes = encode_get_key(&msg);
        let decoded = decode_get_key(&bytes).unwrap();
        assert_eq!(decoded.key_id, msg.key_id);
    }

    #[test]
    fn get_key_ack_round_trips_with_key_material() {
        let msg = MccGetKeyAck {
            status: 0,
            key_id: 7,
            key: KeyWrapper { key_type: MCC_KEY_TYPE_CHACHA20_POLY1305, key: vec![0x11; 32], iv: vec![0x22; 16] },
        };
        let bytes = encode_get_key_ack(&msg);
        let decoded = decode_get_key_ack(&bytes).unwrap();
        assert_eq!(decoded.status, msg.status);
        assert_eq!(decoded.key_id, msg.key_id);
        assert_eq!(decoded.key.key_type, msg.key.key_type);
        assert_eq!(decoded.key.key, msg.key.key);
        assert_eq!(decoded.key.iv, msg.key.iv);
    }

    #[test]
    fn get_key_ack_rejects_truncated_key_field() {
        let msg = MccGetKeyAck {
            status: 0,
            key_id: 7,
            key: KeyWrapper { key_type: MCC_KEY_TYPE_CHACHA20_POLY1305, key: vec![0x11; 32], iv: vec![0x22; 16] },
        };
        let bytes = encode_get_key_ack(&msg);
        assert!(matches!(
            decode_get_key_ack(&bytes[..bytes.len() - 1]),
            Err(McastCodecError::ControlFieldTooShort { .. })
        ));
    }

    #[test]
    fn rekey_round_trips_with_key_material() {
        let msg = MccRekey {
            key_id: 9,
            key: KeyWrapper { key_type: MCC_KEY_TYPE_CHACHA20_POLY1305, key: vec![0x33; 32], iv: vec![0x44; 16] },
        };
        let bytes = encode_rekey(&msg);
        let decoded = decode_rekey(&bytes).unwrap();
        assert_eq!(decoded.key_id, msg.key_id);
        assert_eq!(decoded.key.key, msg.key.key);
        assert_eq!(decoded.key.iv, msg.key.iv);
    }

    #[test]
    fn rekey_ack_round_trips() {
        let msg = MccRekeyAck { status: 0, key_id: 9 };
        let bytes = encode_rekey_ack(&msg);
        let decoded = decode_rekey_ack(&bytes).unwrap();
        assert_eq!(decoded.status, msg.status);
        assert_eq!(decoded.key_id, msg.key_id);
    }

    #[test]
    fn get_info_ack_round_trips_with_address() {
        let msg = MccGetInfoAck { status: 0, address: "239.1.2.3".into(), port: 7421, key_id: 1 };
        let bytes = encode_get_info_ack(&msg);
        let decoded = decode_get_info_ack(&bytes).unwrap();
        assert_eq!(decoded.address, msg.address);
        assert_eq!(decoded.port, msg.port);
        assert_eq!(decoded.key_id, msg.key_id);
    }

    #[test]
    fn get_info_round_trips_empty() {
        let bytes = encode_get_info(&MccGetInfo);
        assert!(bytes.is_empty());
        decode_get_info(&bytes).unwrap();
    }
}
