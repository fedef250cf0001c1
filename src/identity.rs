//! Node identity: a 128-bit UUID and an opaque secret, loaded once at
//! startup and immutable thereafter.

use thiserror::Error;
use uuid::Uuid;

/// Node secrets shorter than this are rejected at load time.
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("id.uuid is not a valid UUID: {0}")]
    InvalidUuid(uuid::Error),
    #[error("id.secret is not valid base64: {0}")]
    InvalidSecretEncoding(base64::DecodeError),
    #[error("id.secret decodes to {0} bytes, need at least {MIN_SECRET_LEN}")]
    SecretTooShort(usize),
}

/// Immutable node identity: UUID plus an opaque secret byte sequence.
#[derive(Clone)]
pub struct NodeIdentity {
    uuid: Uuid,
    secret: Vec<u8>,
}

impl NodeIdentity {
    pub fn new(uuid: Uuid, secret: Vec<u8>) -> Result<Self, IdentityError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(IdentityError::SecretTooShort(secret.len()));
        }
        Ok(Self { uuid, secret })
    }

    /// Parse from the raw config values: a UUID string and a base64-encoded secret.
    pub fn from_config(uuid_str: &str, secret_b64: &str) -> Result<Self, IdentityError> {
        let uuid = Uuid::parse_str(uuid_str).map_err(IdentityError::InvalidUuid)?;
        use base64::Engine;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(secret_b64)
            .map_err(IdentityError::InvalidSecretEncoding)?;
        Self::new(uuid, secret)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn uuid_string(&self) -> String {
        self.uuid.to_string()
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("uuid", &self.uuid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_identity() {
        let id = NodeIdentity::from_config(
            "550e8400-e29b-41d4-a716-446655440000",
            "AAECAwQFBgcICQoLDA0ODw==",
        )
        .unwrap();
        assert_eq!(id.secret().len(), 16);
    }

    #[test]
    fn rejects_short_secret() {
        use base64::Engine;
        let short = base64::engine::general_purpose::STANDARD.encode(b"tooshort");
        let err = NodeIdentity::from_config("550e8400-e29b-41d4-a716-446655440000", &short);
        assert!(matches!(err, Err(IdentityError::SecretTooShort(8))));
    }

    #[test]
    fn rejects_bad_uuid() {
        let err = NodeIdentity::from_config("not-a-uuid", "AAECAwQFBgcICQoLDA0ODw==");
        assert!(matches!(err, Err(IdentityError::InvalidUuid(_))));
    }
}
