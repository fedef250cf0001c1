//! Typed payload structures for all three endpoints. Authentication and
//! PixelData payloads are encoded/decoded with [`super::codec`] (Codec A);
//! MulticastControl payloads are encoded/decoded with
//! [`super::mcast_header`] (Codec B).

use serde::{Deserialize, Serialize};

/// `status == 0` means success on every endpoint; any other value is a
/// server-assigned failure code.
pub const AUTH_SUCCESS: u8 = 0;
pub const PIX_SUCCESS: u8 = 0;
pub const MCC_SUCCESS: u8 = 0;

/// Only ChaCha20-Poly1305 key wrappers are accepted.
pub const MCC_KEY_TYPE_CHACHA20_POLY1305: u32 = 1;

macro_rules! message_type_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn to_wire(self) -> u8 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn from_wire(b: u8) -> Option<Self> {
                match b {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

message_type_enum!(AuthMessageType {
    AuthRequest = 0,
    AuthRequestAck = 1,
    AuthResponse = 2,
    AuthResponseAck = 3,
});

message_type_enum!(PixelMessageType {
    PixSubscribe = 0,
    PixSubscribeAck = 1,
    PixUnsubscribe = 2,
    PixUnsubscribeAck = 3,
    PixData = 4,
    PixDataAck = 5,
});

message_type_enum!(MulticastControlType {
    MccGetInfo = 0,
    MccGetInfoAck = 1,
    MccGetKey = 2,
    MccGetKeyAck = 3,
    MccRekey = 4,
    MccRekeyAck = 5,
});

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Node UUID, formatted as the canonical hyphenated string.
    pub node_id: String,
    /// Authentication methods this node supports, in preference order.
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequestAck {
    pub status: u8,
    /// Method the server selected from `AuthRequest::methods`.
    pub method: String,
}

/// Method-specific response. The baseline `null` method sends an empty
/// body; other methods are opaque payloads keyed by the negotiated method
/// string; implementations must treat the method as extensible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub body: Vec<u8>,
}

impl AuthResponse {
    pub fn null() -> Self {
        Self { body: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponseAck {
    pub status: u8,
}

// ---------------------------------------------------------------------------
// PixelData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelFormat {
    Rgb = 0,
    Rgbw = 1,
}

impl PixelFormat {
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            0 => Some(PixelFormat::Rgb),
            1 => Some(PixelFormat::Rgbw),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgbw => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixSubscribe {
    pub channel: u32,
    pub length: u32,
    pub format: u8,
    /// Offset field the server side is assumed to reject if non-zero;
    /// this client always sends 0.
    pub start: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixSubscribeAck {
    pub status: u8,
    pub subscription_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixUnsubscribe {
    pub channel: u32,
    pub subscription_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixUnsubscribeAck {
    pub status: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixData {
    pub channel: u32,
    pub offset: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixDataAck {
    pub channel: u32,
}

// ---------------------------------------------------------------------------
// MulticastControl
//
// These payloads are encoded/decoded with the zero-copy structural codec in
// `super::mcast_header` (Codec B), not the typed `super::codec` layer above:
// plain value types here, no `Serialize`/`Deserialize`.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MccGetInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MccGetInfoAck {
    pub status: u8,
    pub address: String,
    pub port: u16,
    pub key_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MccGetKey {
    pub key_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWrapper {
    pub key_type: u32,
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MccGetKeyAck {
    pub status: u8,
    pub key_id: u32,
    pub key: KeyWrapper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MccRekey {
    pub key_id: u32,
    pub key: KeyWrapper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MccRekeyAck {
    pub status: u8,
    pub key_id: u32,
}
