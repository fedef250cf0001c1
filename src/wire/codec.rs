//! Codec A: typed payload structures for the Authentication and PixelData
//! endpoints. Fixed field order, little-endian integers, length-prefixed
//! byte strings; implemented with `postcard`'s compact binary schema.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedPayload {
    #[error("payload decode failed: {0}")]
    Decode(postcard::Error),
    #[error("payload encode failed: {0}")]
    Encode(postcard::Error),
    #[error("trailing garbage after decoding payload: {0} bytes left over")]
    TrailingGarbage(usize),
}

/// Serialize a typed payload to bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MalformedPayload> {
    postcard::to_allocvec(value).map_err(MalformedPayload::Encode)
}

/// Deserialize a typed payload, rejecting truncated input, schema mismatch,
/// or trailing bytes after the value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MalformedPayload> {
    let (value, rest) = postcard::take_from_bytes(bytes).map_err(MalformedPayload::Decode)?;
    if !rest.is_empty() {
        return Err(MalformedPayload::TrailingGarbage(rest.len()));
    }
    Ok(value)
}
