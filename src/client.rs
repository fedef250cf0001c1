//! Message mux / client loop and the pixel data path.
//!
//! The dispatch logic is kept as free functions over borrowed state rather
//! than a stateful object, so it can be exercised in tests without a live
//! session.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::multicast::MulticastReceiver;
use crate::output::OutputChannel;
use crate::transport::SecureSession;
use crate::wire::{
    codec, decode_get_info_ack, encode_get_info, Endpoint, MalformedPayload, McastCodecError, MccGetInfo,
    MccGetInfoAck, MulticastControlType, PixData, PixDataAck, PixelMessageType,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("PIX_DATA names channel {channel}, but only {local} local channels are configured")]
    UnknownChannel { channel: u32, local: usize },
}

/// Apply an inbound `PIX_DATA` frame to the matching local channel, found
/// by position in `channels`.
pub fn dispatch_pixel_data(channels: &[Arc<dyn OutputChannel>], data: &PixData) -> Result<(), DispatchError> {
    let idx = data.channel as usize;
    let channel = channels
        .get(idx)
        .ok_or(DispatchError::UnknownChannel { channel: data.channel, local: channels.len() })?;
    channel.update_pixels(data.offset, &data.pixels);
    Ok(())
}

/// Request the multicast group parameters over an authenticated session,
/// between the subscribe phase and message-loop entry.
pub fn get_multicast_info(session: &SecureSession) -> Result<MccGetInfoAck, ClientError> {
    let tag = session.next_tag();
    session.send(Endpoint::MulticastControl, MulticastControlType::MccGetInfo.to_wire(), tag, &encode_get_info(&MccGetInfo))?;

    loop {
        let Some((header, payload)) = session.recv_message()? else {
            continue;
        };
        if header.endpoint != Endpoint::MulticastControl || header.tag != tag {
            continue;
        }
        if MulticastControlType::from_wire(header.message_type) != Some(MulticastControlType::MccGetInfoAck) {
            continue;
        }
        let ack = decode_get_info_ack(&payload)?;
        return Ok(ack);
    }
}

impl From<MalformedPayload> for ClientError {
    fn from(e: MalformedPayload) -> Self {
        ClientError::TransportFatal(e.to_string())
    }
}

impl From<McastCodecError> for ClientError {
    fn from(e: McastCodecError) -> Self {
        ClientError::TransportFatal(e.to_string())
    }
}

/// Drive the steady-state message loop: blocking receive, dispatch by
/// endpoint, same-tag ack replies. Returns when the session requests a
/// reconnect or hits a fatal transport error.
pub fn run_message_loop(
    session: &SecureSession,
    mcast: &MulticastReceiver,
    channels: &[Arc<dyn OutputChannel>],
    shutdown: &std::sync::atomic::AtomicBool,
) -> Result<(), ClientError> {
    use std::sync::atomic::Ordering;

    while !shutdown.load(Ordering::SeqCst) {
        let Some((header, payload)) = session.recv_message()? else {
            if session.needs_reconnect() {
                break;
            }
            continue;
        };

        match header.endpoint {
            Endpoint::PixelData => {
                if PixelMessageType::from_wire(header.message_type) == Some(PixelMessageType::PixData) {
                    handle_pixel_data(session, channels, &header, &payload);
                } else {
                    debug!(message_type = header.message_type, "unhandled PixelData message, ignoring");
                }
            }
            Endpoint::MulticastControl => mcast.handle_message(&header, &payload),
            Endpoint::Authentication => {
                debug!("unexpected Authentication message during steady state, ignoring");
            }
        }

        if session.needs_reconnect() {
            break;
        }
    }
    Ok(())
}

/// Handle a `PIX_DATA` frame: dispatch to the channel, then reply with
/// `PIX_DATA_ACK` on the same tag regardless of dispatch outcome; a
/// handler failure is isolated here and never escapes to the loop.
fn handle_pixel_data(session: &SecureSession, channels: &[Arc<dyn OutputChannel>], header: &crate::wire::MessageHeader, payload: &[u8]) {
    let data: PixData = match codec::decode(payload) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "malformed PIX_DATA, dropping");
            return;
        }
    };

    let channel = data.channel;
    if let Err(e) = dispatch_pixel_data(channels, &data) {
        warn!(error = %e, "PIX_DATA dispatch failed");
    }

    let ack = PixDataAck { channel };
    match codec::encode(&ack) {
        Ok(bytes) => {
            if let Err(e) = session.reply(header, PixelMessageType::PixDataAck.to_wire(), &bytes) {
                warn!(error = %e, "failed to send PIX_DATA_ACK");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode PIX_DATA_ACK"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testutil::DummyChannel;
    use crate::wire::PixelFormat;

    #[test]
    fn rejects_out_of_range_channel() {
        let channels: Vec<Arc<dyn OutputChannel>> = vec![Arc::new(DummyChannel::new(0, 10, PixelFormat::Rgb))];
        let data = PixData { channel: 5, offset: 0, pixels: vec![] };
        let err = dispatch_pixel_data(&channels, &data);
        assert!(matches!(err, Err(DispatchError::UnknownChannel { channel: 5, local: 1 })));
    }

    #[test]
    fn records_call_on_concrete_dummy() {
        let dummy = Arc::new(DummyChannel::new(0, 10, PixelFormat::Rgb));
        let channels: Vec<Arc<dyn OutputChannel>> = vec![dummy.clone()];
        let data = PixData { channel: 0, offset: 2, pixels: vec![9, 9, 9] };
        dispatch_pixel_data(&channels, &data).unwrap();
        assert_eq!(dummy.call_count(), 1);
        assert_eq!(dummy.calls()[0], (2, vec![9, 9, 9]));
    }
}
