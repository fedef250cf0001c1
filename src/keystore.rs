//! Group (multicast) keystore: insert-only map of key id -> symmetric key
//! material, plus the active key pointer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::wire::messages::MCC_KEY_TYPE_CHACHA20_POLY1305;
use crate::wire::KeyWrapper;

/// ChaCha20-Poly1305 key length.
pub const KEY_LEN: usize = 32;
/// IV/nonce-seed length.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("key id {0} already bound; rekey must install a new id")]
    Conflict(u32),
    #[error("unsupported key wrapper type {0}, only ChaCha20-Poly1305 ({MCC_KEY_TYPE_CHACHA20_POLY1305}) is accepted")]
    UnsupportedKeyType(u32),
    #[error("key of {0} bytes is shorter than the required {KEY_LEN}")]
    KeyTooShort(usize),
    #[error("iv of {0} bytes is shorter than the required {IV_LEN}")]
    IvTooShort(usize),
}

/// A single group key binding: 32-byte symmetric key, 16-byte IV/nonce seed.
#[derive(Clone)]
pub struct GroupKey {
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

/// Thread-safe, insert-only keystore with an atomic "current key" pointer.
/// Shared between the message-loop thread (installs keys from
/// `MCC_GET_KEY_ACK`/`MCC_REKEY`) and the multicast thread (looks keys up
/// per inbound datagram).
pub struct Keystore {
    keys: Mutex<HashMap<u32, GroupKey>>,
    current_key_id: AtomicU32,
}

impl Keystore {
    pub fn new(initial_key_id: u32) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            current_key_id: AtomicU32::new(initial_key_id),
        }
    }

    /// Validate and insert a key wrapper under `key_id`. Rejects overwrite,
    /// wrong wrapper type, or undersized key/iv; check-then-insert happens
    /// atomically under the keystore mutex.
    pub fn install(&self, key_id: u32, wrapper: &KeyWrapper) -> Result<(), KeystoreError> {
        if wrapper.key_type != MCC_KEY_TYPE_CHACHA20_POLY1305 {
            return Err(KeystoreError::UnsupportedKeyType(wrapper.key_type));
        }
        if wrapper.key.len() < KEY_LEN {
            return Err(KeystoreError::KeyTooShort(wrapper.key.len()));
        }
        if wrapper.iv.len() < IV_LEN {
            return Err(KeystoreError::IvTooShort(wrapper.iv.len()));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&wrapper.key[..KEY_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&wrapper.iv[..IV_LEN]);

        let mut keys = self.keys.lock().unwrap();
        if keys.contains_key(&key_id) {
            return Err(KeystoreError::Conflict(key_id));
        }
        keys.insert(key_id, GroupKey { key, iv });
        Ok(())
    }

    pub fn get(&self, key_id: u32) -> Option<GroupKey> {
        self.keys.lock().unwrap().get(&key_id).cloned()
    }

    pub fn contains(&self, key_id: u32) -> bool {
        self.keys.lock().unwrap().contains_key(&key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_key_id(&self) -> u32 {
        self.current_key_id.load(Ordering::SeqCst)
    }

    /// Update the active key pointer. Only rekey moves this; installing
    /// the initial key via `MCC_GET_KEY_ACK` must not; the initial value
    /// comes from `setGroupInfo`/`MccGetInfoAck` instead.
    pub fn set_current_key_id(&self, key_id: u32) {
        self.current_key_id.store(key_id, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(key_len: usize, iv_len: usize) -> KeyWrapper {
        KeyWrapper {
            key_type: MCC_KEY_TYPE_CHACHA20_POLY1305,
            key: vec![0xAB; key_len],
            iv: vec![0xCD; iv_len],
        }
    }

    #[test]
    fn rekey_sequence_accumulates_and_moves_current() {
        let store = Keystore::new(0x01);
        store.install(0x01, &wrapper(KEY_LEN, IV_LEN)).unwrap();
        assert_eq!(store.current_key_id(), 0x01); // initial install never moves pointer

        store.install(0x02, &wrapper(KEY_LEN, IV_LEN)).unwrap();
        store.set_current_key_id(0x02);

        assert!(store.contains(0x01));
        assert!(store.contains(0x02));
        assert_eq!(store.current_key_id(), 0x02);
    }

    #[test]
    fn rejects_overwrite() {
        let store = Keystore::new(0x01);
        store.install(0x01, &wrapper(KEY_LEN, IV_LEN)).unwrap();
        let err = store.install(0x01, &wrapper(KEY_LEN, IV_LEN));
        assert_eq!(err, Err(KeystoreError::Conflict(0x01)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_unsupported_key_type() {
        let store = Keystore::new(0x01);
        let mut w = wrapper(KEY_LEN, IV_LEN);
        w.key_type = 99;
        assert_eq!(store.install(0x01, &w), Err(KeystoreError::UnsupportedKeyType(99)));
    }

    #[test]
    fn boundary_key_length() {
        let store = Keystore::new(0x01);
        assert_eq!(store.install(0x01, &wrapper(31, IV_LEN)), Err(KeystoreError::KeyTooShort(31)));

        let store2 = Keystore::new(0x01);
        assert!(store2.install(0x01, &wrapper(32, IV_LEN)).is_ok());
    }
}
