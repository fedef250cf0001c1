//! Secure session: resolves already done by the caller, opens a UDP
//! socket, performs a DTLS handshake, drives authentication, and then
//! exposes `send`/`recvMessage`/`close`.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use openssl::ssl::{ErrorCode, HandshakeError, MidHandshakeSslStream, SslConnector, SslMethod, SslStream, SslVerifyMode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::identity::NodeIdentity;
use crate::wire::{check_payload_len, Endpoint, MessageHeader, HEADER_LEN};

/// Consecutive failed handshake attempts before giving up.
pub const KCONNECTION_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
enum SetupError {
    #[error("peer closed during handshake")]
    Closed,
    #[error("handshake read timed out")]
    Timeout,
    #[error("transport syscall failure: {0}")]
    Syscall(io::Error),
    #[error("handshake error: {0}")]
    Handshake(String),
}

impl SetupError {
    fn is_retryable(&self) -> bool {
        matches!(self, SetupError::Closed | SetupError::Timeout)
    }
}

/// Authenticated, encrypted unicast session. Owned exclusively by the
/// message-loop thread for reads; writes go through a mutex so the
/// multicast thread's narrow send capability can use the same transport.
pub struct SecureSession {
    stream: Mutex<SslStream<super::udp_io::UdpIo>>,
    next_tag: Arc<AtomicU8>,
    needs_reconnect: AtomicBool,
    clean_shutdown_permitted: AtomicBool,
}

impl SecureSession {
    /// Run the full connect algorithm: open socket, DTLS handshake with
    /// retry up to [`KCONNECTION_ATTEMPTS`], then drive authentication.
    /// Blocks until an authenticated session exists or fails fatally.
    pub fn connect(addr: SocketAddr, read_timeout: Duration, identity: &NodeIdentity) -> Result<Self, ClientError> {
        let mut attempts: u32 = 0;
        let mut last_error = String::new();

        loop {
            match Self::handshake_once(addr, read_timeout) {
                Ok(session) => {
                    crate::auth::authenticate(&session, identity)
                        .map_err(|e| ClientError::AuthDenied(e.to_string()))?;
                    info!(peer = %addr, "session authenticated");
                    return Ok(session);
                }
                Err(e) if e.is_retryable() => {
                    attempts += 1;
                    let transient = ClientError::TransportTransient(e.to_string());
                    warn!(attempt = attempts, error = %transient, "connect attempt failed, retrying");
                    last_error = transient.to_string();
                    if attempts >= KCONNECTION_ATTEMPTS {
                        return Err(ClientError::ConnectRetriesExhausted { attempts, last_error });
                    }
                }
                Err(e) => return Err(ClientError::TransportFatal(e.to_string())),
            }
        }
    }

    fn handshake_once(addr: SocketAddr, read_timeout: Duration) -> Result<Self, SetupError> {
        let bind_addr: SocketAddr = if addr.is_ipv4() { "0.0.0.0:0".parse().unwrap() } else { "[::]:0".parse().unwrap() };
        let socket = UdpSocket::bind(bind_addr).map_err(SetupError::Syscall)?;
        socket.connect(addr).map_err(SetupError::Syscall)?;

        let io = super::udp_io::UdpIo::new(socket);
        // Read-ahead lets the record layer buffer a whole datagram at a time.
        io.set_read_timeout(Some(read_timeout)).map_err(SetupError::Syscall)?;

        let mut builder = SslConnector::builder(SslMethod::dtls()).map_err(|e| SetupError::Handshake(e.to_string()))?;
        // The protocol authenticates nodes at the application layer;
        // there is no PKI, so certificate verification is disabled here.
        builder.set_verify(SslVerifyMode::NONE);
        let connector = builder.build();

        let stream = match connector.connect(&addr.ip().to_string(), io) {
            Ok(s) => s,
            Err(HandshakeError::SetupFailure(e)) => return Err(SetupError::Handshake(e.to_string())),
            Err(HandshakeError::Failure(mid)) => return Err(classify_mid_handshake(mid)),
            Err(HandshakeError::WouldBlock(mid)) => return Err(classify_mid_handshake(mid)),
        };

        debug!(peer = %addr, "DTLS handshake complete");

        Ok(Self {
            stream: Mutex::new(stream),
            next_tag: Arc::new(AtomicU8::new(0)),
            needs_reconnect: AtomicBool::new(false),
            clean_shutdown_permitted: AtomicBool::new(true),
        })
    }

    /// Allocate the next tag (wraps modulo 256).
    pub fn next_tag(&self) -> u8 {
        self.next_tag.fetch_add(1, Ordering::SeqCst)
    }

    pub fn needs_reconnect(&self) -> bool {
        self.needs_reconnect.load(Ordering::SeqCst)
    }

    /// Mark the session for reconnect: set by the message loop when a
    /// handler decides the session can no longer be trusted, and
    /// internally by every fatal transport path.
    pub fn request_reconnect(&self) {
        self.needs_reconnect.store(true, Ordering::SeqCst);
        self.clean_shutdown_permitted.store(false, Ordering::SeqCst);
    }

    /// Send a fully framed message in one write call.
    pub fn send(&self, endpoint: Endpoint, message_type: u8, tag: u8, payload: &[u8]) -> Result<(), ClientError> {
        let length = check_payload_len(payload.len()).map_err(|e| ClientError::TransportFatal(e.to_string()))?;
        let header = MessageHeader::new(endpoint, message_type, tag, length);

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(payload);

        let mut stream = self.stream.lock().unwrap();
        use std::io::Write;
        stream.write_all(&frame).map_err(|e| {
            self.mark_fatal();
            ClientError::TransportFatal(format!("short/failed write: {e}"))
        })
    }

    /// Reply to an incoming message: same endpoint/tag, different type.
    pub fn reply(&self, incoming: &MessageHeader, message_type: u8, payload: &[u8]) -> Result<(), ClientError> {
        self.send(incoming.endpoint, message_type, incoming.tag, payload)
    }

    /// Blocking receive up to the configured read timeout. `Ok(None)` means
    /// "no message" (timeout, caller should retry); peer-closed or syscall
    /// error is a fatal `ClientError`.
    pub fn recv_message(&self) -> Result<Option<(MessageHeader, Vec<u8>)>, ClientError> {
        let mut stream = self.stream.lock().unwrap();

        let mut header_buf = [0u8; HEADER_LEN];
        match stream.ssl_read(&mut header_buf) {
            Ok(n) if n == HEADER_LEN => {}
            Ok(n) => {
                self.mark_fatal();
                return Err(ClientError::TransportFatal(format!("short header read: {n} bytes")));
            }
            Err(e) => return self.classify_recv_error(e),
        }

        let header = MessageHeader::decode(&header_buf).map_err(|e| {
            self.mark_fatal();
            ClientError::TransportFatal(e.to_string())
        })?;

        let mut payload = vec![0u8; header.length as usize];
        if header.length > 0 {
            match stream.ssl_read(&mut payload) {
                Ok(n) if n == payload.len() => {}
                Ok(n) => {
                    self.mark_fatal();
                    return Err(ClientError::TransportFatal(format!("short payload read: {n} of {} bytes", payload.len())));
                }
                Err(e) => return self.classify_recv_error(e),
            }
        }

        Ok(Some((header, payload)))
    }

    fn classify_recv_error(&self, e: openssl::ssl::Error) -> Result<Option<(MessageHeader, Vec<u8>)>, ClientError> {
        match e.code() {
            ErrorCode::ZERO_RETURN => {
                self.mark_fatal();
                Err(ClientError::TransportFatal("peer closed connection".into()))
            }
            ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => Ok(None),
            _ => {
                if let Some(io_err) = e.io_error() {
                    if matches!(io_err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                        return Ok(None);
                    }
                }
                self.mark_fatal();
                Err(ClientError::TransportFatal(e.to_string()))
            }
        }
    }

    /// A transport-level fault that means the unicast connection can no
    /// longer be trusted: request a reconnect and forbid a clean DTLS
    /// shutdown (the stream is already in an unknown state).
    fn mark_fatal(&self) {
        self.request_reconnect();
    }

    /// Attempt a clean DTLS shutdown if permitted; otherwise tear the
    /// socket down unconditionally.
    pub fn close(&self) {
        if self.clean_shutdown_permitted.load(Ordering::SeqCst) {
            let mut stream = self.stream.lock().unwrap();
            if let Err(e) = stream.shutdown() {
                debug!(error = %e, "clean DTLS shutdown failed, closing anyway");
            }
        } else {
            debug!("skipping clean shutdown: clean-shutdown flag was cleared");
        }
    }
}

fn classify_mid_handshake(mid: MidHandshakeSslStream<super::udp_io::UdpIo>) -> SetupError {
    let err = mid.error();
    match err.code() {
        ErrorCode::ZERO_RETURN => SetupError::Closed,
        _ => {
            if let Some(io_err) = err.io_error() {
                if matches!(io_err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                    return SetupError::Timeout;
                }
                return SetupError::Syscall(io::Error::new(io_err.kind(), io_err.to_string()));
            }
            SetupError::Handshake(err.to_string())
        }
    }
}
