//! Multicast receiver: joins the group, receives frames on its own
//! thread, authenticate-decrypts with a keystore-resolved key, and
//! dispatches to output channels. Also handles the group-control messages
//! that arrive over the *unicast* session (`MCC_GET_KEY_ACK`, `MCC_REKEY`).

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::keystore::Keystore;
use crate::output::OutputChannel;
use crate::wire::header::MessageHeader;
use crate::wire::{
    decode_get_key_ack, decode_rekey, encode_get_key, encode_rekey_ack, parse_datagram, parse_sync_output, Endpoint,
    KeyWrapper, MccGetKey, MulticastControlType, MCC_SUCCESS,
};

/// How long the worker's socket read blocks before re-checking the
/// shutdown flag.
const WORKER_POLL_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum MulticastError {
    #[error("invalid multicast group address {0}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),
    #[error("failed to open multicast socket: {0}")]
    Socket(std::io::Error),
    #[error(transparent)]
    Transport(#[from] ClientError),
}

/// Narrow capability the multicast receiver is given into the unicast
/// session: send/reply/tag allocation only, no access to transport
/// internals.
pub trait SessionSender: Send + Sync {
    fn send(&self, endpoint: Endpoint, message_type: u8, tag: u8, payload: &[u8]) -> Result<(), ClientError>;
    fn reply(&self, incoming: &MessageHeader, message_type: u8, payload: &[u8]) -> Result<(), ClientError>;
    fn next_tag(&self) -> u8;
}

impl SessionSender for crate::transport::SecureSession {
    fn send(&self, endpoint: Endpoint, message_type: u8, tag: u8, payload: &[u8]) -> Result<(), ClientError> {
        crate::transport::SecureSession::send(self, endpoint, message_type, tag, payload)
    }

    fn reply(&self, incoming: &MessageHeader, message_type: u8, payload: &[u8]) -> Result<(), ClientError> {
        crate::transport::SecureSession::reply(self, incoming, message_type, payload)
    }

    fn next_tag(&self) -> u8 {
        crate::transport::SecureSession::next_tag(self)
    }
}

pub struct MulticastReceiver {
    sender: Arc<dyn SessionSender>,
    keystore: Arc<Keystore>,
    channels: Arc<Vec<Arc<dyn OutputChannel>>>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MulticastReceiver {
    pub fn new(sender: Arc<dyn SessionSender>, keystore: Arc<Keystore>, channels: Arc<Vec<Arc<dyn OutputChannel>>>) -> Self {
        Self {
            sender,
            keystore,
            channels,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Parse the group address, request the initial key, join the group,
    /// and start the receive worker. The current-key pointer is set
    /// directly from the server-supplied value here; a later
    /// `MCC_GET_KEY_ACK` for this same key must not move it again.
    pub fn set_group_info(&self, address: &str, port: u16, initial_key_id: u32) -> Result<(), MulticastError> {
        let group_addr =
            Ipv4Addr::from_str(address).map_err(|e| MulticastError::InvalidAddress(address.to_owned(), e))?;
        self.keystore.set_current_key_id(initial_key_id);

        let tag = self.sender.next_tag();
        let payload = encode_get_key(&MccGetKey { key_id: initial_key_id });
        self.sender
            .send(Endpoint::MulticastControl, MulticastControlType::MccGetKey.to_wire(), tag, &payload)?;

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).map_err(MulticastError::Socket)?;
        socket
            .join_multicast_v4(&group_addr, &Ipv4Addr::UNSPECIFIED)
            .map_err(MulticastError::Socket)?;
        socket.set_read_timeout(Some(WORKER_POLL_TIMEOUT)).map_err(MulticastError::Socket)?;

        self.shutdown.store(false, Ordering::SeqCst);
        let keystore = Arc::clone(&self.keystore);
        let channels = Arc::clone(&self.channels);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = std::thread::spawn(move || worker_main(socket, group_addr, keystore, channels, shutdown));
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Handle a `MulticastControl` message that arrived on the unicast
    /// session. Runs on the message-loop thread.
    pub fn handle_message(&self, header: &MessageHeader, payload: &[u8]) {
        match MulticastControlType::from_wire(header.message_type) {
            Some(MulticastControlType::MccGetKeyAck) => self.handle_get_key_ack(payload),
            Some(MulticastControlType::MccRekey) => self.handle_rekey(header, payload),
            other => debug!(?other, "unhandled multicast control message type"),
        }
    }

    fn handle_get_key_ack(&self, payload: &[u8]) {
        let ack = match decode_get_key_ack(payload) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "malformed MCC_GET_KEY_ACK, dropping");
                return;
            }
        };
        if ack.status != MCC_SUCCESS {
            warn!(status = ack.status, "MCC_GET_KEY_ACK reported failure");
            return;
        }
        install_key(&self.keystore, ack.key_id, &ack.key);
    }

    fn handle_rekey(&self, header: &MessageHeader, payload: &[u8]) {
        let rekey = match decode_rekey(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed MCC_REKEY, dropping");
                return;
            }
        };
        if !install_key(&self.keystore, rekey.key_id, &rekey.key) {
            return;
        }
        self.keystore.set_current_key_id(rekey.key_id);

        let ack = crate::wire::MccRekeyAck { status: MCC_SUCCESS, key_id: rekey.key_id };
        let bytes = encode_rekey_ack(&ack);
        if let Err(e) = self.sender.reply(header, MulticastControlType::MccRekeyAck.to_wire(), &bytes) {
            warn!(error = %e, "failed to send MCC_REKEY_ACK");
        }
    }

    /// Stop the worker thread and leave the group. Idempotent: calling
    /// this when no worker is running is a no-op.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Validate and install a key wrapper, logging and dropping on any
/// rejection (conflict, wrong type, undersized). Returns whether the
/// install succeeded.
fn install_key(keystore: &Keystore, key_id: u32, wrapper: &KeyWrapper) -> bool {
    match keystore.install(key_id, wrapper) {
        Ok(()) => true,
        Err(e) => {
            warn!(key_id, error = %e, "key install rejected, dropping");
            false
        }
    }
}

fn worker_main(
    socket: UdpSocket,
    group_addr: Ipv4Addr,
    keystore: Arc<Keystore>,
    channels: Arc<Vec<Arc<dyn OutputChannel>>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 65536];
    while !shutdown.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((n, _src)) => handle_datagram(&buf[..n], &keystore, &channels),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!(error = %e, "multicast recv error");
                continue;
            }
        }
    }
    let _ = socket.leave_multicast_v4(&group_addr, &Ipv4Addr::UNSPECIFIED);
}

fn handle_datagram(buf: &[u8], keystore: &Keystore, channels: &[Arc<dyn OutputChannel>]) {
    let datagram = match parse_datagram(buf) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "malformed multicast datagram, dropping");
            return;
        }
    };

    let key_id = datagram.header.key_id.get();
    let Some(group_key) = keystore.get(key_id) else {
        warn!(key_id, "no key for multicast datagram, dropping");
        return;
    };

    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[..4].copy_from_slice(&group_key.iv[..4]);
    nonce_bytes[4..].copy_from_slice(&datagram.header.sequence.get().to_be_bytes());
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&group_key.key));
    let header_bytes = &buf[..crate::wire::MCAST_HEADER_LEN];
    let plaintext = match cipher.decrypt(nonce, Payload { msg: datagram.ciphertext, aad: header_bytes }) {
        Ok(p) => p,
        Err(_) => {
            warn!(key_id, "multicast AEAD decrypt failed, dropping");
            return;
        }
    };

    let frame = match parse_sync_output(&plaintext) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "malformed sync-output frame, dropping");
            return;
        }
    };

    match channels.iter().find(|c| c.channel_index() == frame.channel) {
        Some(channel) => channel.update_pixels(0, frame.pixel_words),
        None => warn!(channel = frame.channel, "sync-output for unknown channel, dropping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testutil::DummyChannel;
    use crate::wire::PixelFormat;

    fn make_ciphertext(key: &[u8; 32], iv: &[u8; 16], sequence: u64, plaintext: &[u8]) -> (Vec<u8>, u32) {
        let key_id = 7u32;
        let mut header = Vec::new();
        header.extend_from_slice(&key_id.to_be_bytes());
        header.extend_from_slice(&sequence.to_be_bytes());

        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[..4].copy_from_slice(&iv[..4]);
        nonce_bytes[4..].copy_from_slice(&sequence.to_be_bytes());

        let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad: &header })
            .unwrap();

        header.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
        header.extend_from_slice(&ciphertext);
        (header, key_id)
    }

    #[test]
    fn decrypts_and_dispatches_sync_output() {
        let keystore = Keystore::new(7);
        let key = [0x11u8; 32];
        let iv = [0x22u8; 16];
        keystore
            .install(7, &KeyWrapper { key_type: crate::wire::messages::MCC_KEY_TYPE_CHACHA20_POLY1305, key: key.to_vec(), iv: iv.to_vec() })
            .unwrap();

        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(&3u32.to_be_bytes()); // channel 3
        plaintext.extend_from_slice(&[1, 2, 3, 4]); // one packed pixel word

        let (datagram, _key_id) = make_ciphertext(&key, &iv, 1, &plaintext);

        let channel = Arc::new(DummyChannel::new(3, 1, PixelFormat::Rgb));
        let channels: Vec<Arc<dyn OutputChannel>> = vec![channel.clone()];

        handle_datagram(&datagram, &keystore, &channels);

        assert_eq!(channel.call_count(), 1);
        assert_eq!(channel.calls()[0], (0, vec![1, 2, 3, 4]));
    }

    #[test]
    fn drops_datagram_with_unknown_key() {
        let keystore = Keystore::new(1);
        let channels: Vec<Arc<dyn OutputChannel>> = Vec::new();
        let (datagram, _) = make_ciphertext(&[0u8; 32], &[0u8; 16], 0, b"abcd");
        // keystore has no key 7 installed; should log+drop, not panic
        handle_datagram(&datagram, &keystore, &channels);
    }
}
