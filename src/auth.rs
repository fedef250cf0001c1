//! Auth state machine:
//! `SEND_REQ -> READ_REQ_ACK -> SEND_RESPONSE -> READ_AUTH_STATE -> {success|fail}`.

use thiserror::Error;
use tracing::warn;

use crate::error::ClientError;
use crate::transport::SecureSession;
use crate::wire::{codec, AuthMessageType, AuthRequest, AuthRequestAck, AuthResponse, AuthResponseAck, Endpoint, MalformedPayload, AUTH_SUCCESS};

/// Authentication methods this node offers, in preference order. Only the
/// baseline `null` method is implemented; the method string is treated as
/// opaque so additional methods can be added without touching the state
/// machine's control flow.
const SUPPORTED_METHODS: &[&str] = &["null"];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error("malformed auth payload: {0}")]
    Malformed(#[from] MalformedPayload),
    #[error("authentication denied, status {0}")]
    Denied(u8),
}

/// Drive the full handshake over an already-connected secure session.
/// Credentials are static, so any denial is immediately fatal. There is
/// no retry here (that happens one level up, in the transport connect
/// retry loop, and only for the transport handshake itself).
pub fn authenticate(session: &SecureSession, identity: &crate::identity::NodeIdentity) -> Result<(), AuthError> {
    let req_tag = session.next_tag();
    let request = AuthRequest {
        node_id: identity.uuid_string(),
        methods: SUPPORTED_METHODS.iter().map(|s| s.to_string()).collect(),
    };
    session.send(Endpoint::Authentication, AuthMessageType::AuthRequest.to_wire(), req_tag, &codec::encode(&request)?)?;

    let method = read_ack::<AuthRequestAck>(session, req_tag, AuthMessageType::AuthRequestAck)?;
    if method.status != AUTH_SUCCESS {
        return Err(AuthError::Denied(method.status));
    }

    let resp_tag = session.next_tag();
    let response = build_response(&method.method);
    session.send(Endpoint::Authentication, AuthMessageType::AuthResponse.to_wire(), resp_tag, &codec::encode(&response)?)?;

    let ack = read_ack::<AuthResponseAck>(session, resp_tag, AuthMessageType::AuthResponseAck)?;
    if ack.status != AUTH_SUCCESS {
        return Err(AuthError::Denied(ack.status));
    }

    Ok(())
}

/// Build the method-specific response. Implementations MUST treat the
/// method string as opaque. Today only `null` is known, so
/// anything else falls back to an empty body rather than failing, leaving
/// room to add methods without restructuring the state machine.
fn build_response(method: &str) -> AuthResponse {
    match method {
        "null" => AuthResponse::null(),
        other => {
            warn!(method = other, "unrecognized auth method, sending empty response");
            AuthResponse::null()
        }
    }
}

/// Read until a message matching `(Authentication, expected_type, tag)`
/// arrives. Any mismatch (wrong endpoint, wrong tag, wrong type, or a
/// timeout) loops rather than failing, to tolerate stray late messages.
/// A payload decode error, once the header matches, is fatal.
fn read_ack<T: serde::de::DeserializeOwned>(
    session: &SecureSession,
    tag: u8,
    expected_type: AuthMessageType,
) -> Result<T, AuthError> {
    loop {
        let Some((header, payload)) = session.recv_message()? else {
            continue;
        };
        if header.endpoint != Endpoint::Authentication || header.tag != tag {
            continue;
        }
        if AuthMessageType::from_wire(header.message_type) != Some(expected_type) {
            continue;
        }
        return Ok(codec::decode(&payload)?);
    }
}
