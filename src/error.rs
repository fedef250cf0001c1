//! Top-level error taxonomy: the supervisor matches on these variants
//! to decide local recovery, session-level reconnect, or process exit.
//! Payload-decode and key-install errors are recovered locally by the
//! modules that raise them ([`crate::wire::MalformedPayload`],
//! [`crate::keystore::KeystoreError`]) and never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to resolve server address: {0}")]
    ResolveFailed(String),

    #[error("transport error (retryable): {0}")]
    TransportTransient(String),

    #[error("exhausted {attempts} connection attempts: {last_error}")]
    ConnectRetriesExhausted { attempts: u32, last_error: String },

    #[error("fatal transport error: {0}")]
    TransportFatal(String),

    #[error("authentication denied: {0}")]
    AuthDenied(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
}

impl ClientError {
    /// Whether this error should terminate the whole process (vs. trigger
    /// a session-level reconnect). Only static-credential auth denial and
    /// exhausted connect retries are process-fatal.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, ClientError::AuthDenied(_) | ClientError::ConnectRetriesExhausted { .. } | ClientError::ConfigInvalid(_) | ClientError::ResolveFailed(_))
    }
}
