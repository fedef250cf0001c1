//! Wire codec: frame header, typed-payload codec (Codec A), and the
//! zero-copy multicast structural codec (Codec B).

pub mod codec;
pub mod header;
pub mod mcast_header;
pub mod messages;

pub use codec::MalformedPayload;
pub use header::{check_payload_len, Endpoint, HeaderError, MessageHeader, HEADER_LEN, MAX_PAYLOAD_LEN, PROTO_VERSION};
pub use mcast_header::{
    decode_get_info, decode_get_info_ack, decode_get_key, decode_get_key_ack, decode_rekey, decode_rekey_ack,
    encode_get_info, encode_get_info_ack, encode_get_key, encode_get_key_ack, encode_rekey, encode_rekey_ack,
    parse_datagram, parse_sync_output, McastCodecError, McastDataSyncOutput, McastDatagram, McastHeader,
    MCAST_HEADER_LEN,
};
pub use messages::*;
