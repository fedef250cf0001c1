//! Scenario test: a full four-step auth exchange built entirely from the
//! wire layer (header + Codec A), the same frames the session and auth
//! state machine would produce/consume, without needing a live socket.

use lichtenstein_client::wire::{
    codec, AuthMessageType, AuthRequest, AuthRequestAck, AuthResponse, AuthResponseAck, Endpoint, MessageHeader,
    AUTH_SUCCESS,
};

fn frame(endpoint: Endpoint, message_type: u8, tag: u8, payload: &[u8]) -> Vec<u8> {
    let header = MessageHeader::new(endpoint, message_type, tag, payload.len() as u16);
    let mut buf = header.encode().to_vec();
    buf.extend_from_slice(payload);
    buf
}

#[test]
fn test_auth_exchange_round_trips_through_the_wire_layer() {
    let tag = 3u8;

    let req = AuthRequest { node_id: "550e8400-e29b-41d4-a716-446655440000".into(), methods: vec!["null".into()] };
    let req_bytes = codec::encode(&req).unwrap();
    let req_frame = frame(Endpoint::Authentication, AuthMessageType::AuthRequest.to_wire(), tag, &req_bytes);

    let (header, payload) = split(&req_frame);
    assert_eq!(header.endpoint, Endpoint::Authentication);
    assert_eq!(AuthMessageType::from_wire(header.message_type), Some(AuthMessageType::AuthRequest));
    let decoded: AuthRequest = codec::decode(payload).unwrap();
    assert_eq!(decoded.node_id, req.node_id);

    let ack = AuthRequestAck { status: AUTH_SUCCESS, method: "null".into() };
    let ack_bytes = codec::encode(&ack).unwrap();
    let ack_frame = frame(Endpoint::Authentication, AuthMessageType::AuthRequestAck.to_wire(), tag, &ack_bytes);
    let (ack_header, ack_payload) = split(&ack_frame);
    assert_eq!(ack_header.tag, tag);
    let decoded_ack: AuthRequestAck = codec::decode(ack_payload).unwrap();
    assert_eq!(decoded_ack.status, AUTH_SUCCESS);

    let response = AuthResponse::null();
    let resp_bytes = codec::encode(&response).unwrap();
    let resp_frame = frame(Endpoint::Authentication, AuthMessageType::AuthResponse.to_wire(), tag, &resp_bytes);
    let (resp_header, resp_payload) = split(&resp_frame);
    assert_eq!(AuthMessageType::from_wire(resp_header.message_type), Some(AuthMessageType::AuthResponse));
    let decoded_resp: AuthResponse = codec::decode(resp_payload).unwrap();
    assert!(decoded_resp.body.is_empty());

    let final_ack = AuthResponseAck { status: AUTH_SUCCESS };
    let final_bytes = codec::encode(&final_ack).unwrap();
    let final_frame = frame(Endpoint::Authentication, AuthMessageType::AuthResponseAck.to_wire(), tag, &final_bytes);
    let (final_header, final_payload) = split(&final_frame);
    assert_eq!(final_header.tag, tag);
    let decoded_final: AuthResponseAck = codec::decode(final_payload).unwrap();
    assert_eq!(decoded_final.status, AUTH_SUCCESS);
}

fn split(frame: &[u8]) -> (MessageHeader, &[u8]) {
    let header = MessageHeader::decode(&frame[..8]).unwrap();
    (header, &frame[8..8 + header.length as usize])
}
