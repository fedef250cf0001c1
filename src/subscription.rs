//! Subscription manager: subscribes every local output channel for
//! pixel updates and tracks the resulting tokens.

use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::output::OutputChannel;
use crate::transport::SecureSession;
use crate::wire::{codec, Endpoint, MalformedPayload, PixSubscribe, PixSubscribeAck, PixUnsubscribe, PixUnsubscribeAck, PixelMessageType, PIX_SUCCESS};

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error("malformed subscribe payload: {0}")]
    Malformed(#[from] MalformedPayload),
    #[error("subscribe for channel {channel} failed, status {status}")]
    Denied { channel: u32, status: u8 },
}

/// A (channel index, subscription token) pair: one entry per active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub channel_index: u32,
    pub subscription_id: u32,
}

/// Owns the list of active subscriptions. One instance lives for the
/// lifetime of the supervisor, recreated records on every (re)connect.
pub struct SubscriptionManager {
    active: Mutex<Vec<SubscriptionRecord>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self { active: Mutex::new(Vec::new()) }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn active_records(&self) -> Vec<SubscriptionRecord> {
        self.active.lock().unwrap().clone()
    }

    /// Subscribe every channel in order. The whole phase fails on the
    /// first non-success ack; the caller must then tear the session down
    /// and reconnect.
    pub fn subscribe_all(&self, session: &SecureSession, channels: &[std::sync::Arc<dyn OutputChannel>]) -> Result<(), SubscribeError> {
        for channel in channels {
            let tag = session.next_tag();
            let request = PixSubscribe {
                channel: channel.channel_index(),
                length: channel.pixel_count(),
                format: channel.pixel_format().to_wire(),
                start: 0,
            };
            session.send(Endpoint::PixelData, PixelMessageType::PixSubscribe.to_wire(), tag, &codec::encode(&request)?)?;

            let ack: PixSubscribeAck = read_matching(session, tag, PixelMessageType::PixSubscribeAck)?;
            if ack.status != PIX_SUCCESS {
                return Err(SubscribeError::Denied { channel: channel.channel_index(), status: ack.status });
            }

            self.active.lock().unwrap().push(SubscriptionRecord {
                channel_index: channel.channel_index(),
                subscription_id: ack.subscription_id,
            });
            debug!(channel = channel.channel_index(), subscription_id = ack.subscription_id, "subscribed");
        }
        Ok(())
    }

    /// Best-effort unsubscribe of every active record; individual failures
    /// are logged and skipped. The list is cleared unconditionally,
    /// including when it was already empty (a no-op).
    pub fn unsubscribe_all(&self, session: &SecureSession) {
        let records = std::mem::take(&mut *self.active.lock().unwrap());
        for record in records {
            if let Err(e) = unsubscribe_one(session, record) {
                warn!(channel = record.channel_index, error = %e, "unsubscribe failed, skipping");
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn unsubscribe_one(session: &SecureSession, record: SubscriptionRecord) -> Result<(), SubscribeError> {
    let tag = session.next_tag();
    let request = PixUnsubscribe { channel: record.channel_index, subscription_id: record.subscription_id };
    session.send(Endpoint::PixelData, PixelMessageType::PixUnsubscribe.to_wire(), tag, &codec::encode(&request)?)?;
    let ack: PixUnsubscribeAck = read_matching(session, tag, PixelMessageType::PixUnsubscribeAck)?;
    if ack.status != PIX_SUCCESS {
        return Err(SubscribeError::Denied { channel: record.channel_index, status: ack.status });
    }
    Ok(())
}

fn read_matching<T: serde::de::DeserializeOwned>(
    session: &SecureSession,
    tag: u8,
    expected_type: PixelMessageType,
) -> Result<T, SubscribeError> {
    loop {
        let Some((header, payload)) = session.recv_message()? else {
            continue;
        };
        if header.endpoint != Endpoint::PixelData || header.tag != tag {
            continue;
        }
        if PixelMessageType::from_wire(header.message_type) != Some(expected_type) {
            continue;
        }
        return Ok(codec::decode(&payload)?);
    }
}

/// Map the wire pixel-format byte to a validated [`crate::wire::PixelFormat`].
/// Values other than 0/1 are a hard error at subscribe time.
pub fn validate_pixel_format(raw: u8) -> Result<crate::wire::PixelFormat, String> {
    crate::wire::PixelFormat::from_wire(raw).ok_or_else(|| format!("unsupported pixel format value {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_validation() {
        assert!(validate_pixel_format(0).is_ok());
        assert!(validate_pixel_format(1).is_ok());
        assert!(validate_pixel_format(2).is_err());
    }

    #[test]
    fn empty_unsubscribe_list_tracked_correctly() {
        let mgr = SubscriptionManager::new();
        assert_eq!(mgr.active_count(), 0);
    }
}
