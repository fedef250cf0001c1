//! Scenario test for the group keystore across a full bootstrap + rekey
//! lifecycle: initial key never moves the pointer, rekey accumulates and
//! then moves it, and a repeated key id is rejected.

use lichtenstein_client::keystore::Keystore;
use lichtenstein_client::wire::{KeyWrapper, MCC_KEY_TYPE_CHACHA20_POLY1305};

fn wrapper() -> KeyWrapper {
    KeyWrapper { key_type: MCC_KEY_TYPE_CHACHA20_POLY1305, key: vec![0x42; 32], iv: vec![0x24; 16] }
}

#[test]
fn test_bootstrap_then_two_rekeys() {
    let store = Keystore::new(1);
    assert_eq!(store.current_key_id(), 1);

    // MCC_GET_KEY_ACK for the initial key: installs but does not move the pointer.
    store.install(1, &wrapper()).unwrap();
    assert_eq!(store.current_key_id(), 1);
    assert_eq!(store.len(), 1);

    // First rekey.
    store.install(2, &wrapper()).unwrap();
    store.set_current_key_id(2);
    assert_eq!(store.current_key_id(), 2);
    assert_eq!(store.len(), 2);

    // Second rekey; old keys remain installed (receivers may still hold
    // in-flight datagrams encrypted under them).
    store.install(3, &wrapper()).unwrap();
    store.set_current_key_id(3);
    assert_eq!(store.current_key_id(), 3);
    assert!(store.contains(1));
    assert!(store.contains(2));
    assert!(store.contains(3));
}

#[test]
fn test_rekey_with_reused_id_is_rejected_and_current_key_unaffected() {
    let store = Keystore::new(1);
    store.install(1, &wrapper()).unwrap();
    store.install(2, &wrapper()).unwrap();
    store.set_current_key_id(2);

    assert!(store.install(2, &wrapper()).is_err());
    assert_eq!(store.current_key_id(), 2);
    assert_eq!(store.len(), 2);
}
