//! Integration test for loading a full node configuration end to end:
//! identity, endpoint, and channel tables, as `main` would on startup.

use lichtenstein_client::config::Config;
use lichtenstein_client::endpoint::ServerEndpoint;
use lichtenstein_client::identity::NodeIdentity;
use std::io::Write;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_loads_full_node_config() {
    let file = write_config(
        r#"
        [id]
        uuid = "550e8400-e29b-41d4-a716-446655440000"
        secret = "AAECAwQFBgcICQoLDA0ODw=="

        [remote.server]
        address = "10.0.0.5"
        port = 7420
        ipv4_only = true

        [remote]
        recv_timeout = 1.5

        [channels]
        count = 2

        [channels.0]
        pixel_count = 150
        format = "rgb"

        [channels.1]
        pixel_count = 64
        format = "rgbw"
        "#,
    );

    let cfg = Config::load(file.path()).unwrap();

    let identity = NodeIdentity::from_config(
        &cfg.get_string_required("id.uuid").unwrap(),
        &cfg.get_string_required("id.secret").unwrap(),
    )
    .unwrap();
    assert_eq!(identity.uuid_string(), "550e8400-e29b-41d4-a716-446655440000");

    let endpoint = ServerEndpoint::new(
        cfg.get_string("remote.server.address", "unset"),
        cfg.get_u64("remote.server.port", 0) as u16,
        cfg.get_bool("remote.server.ipv4_only", false),
    );
    assert_eq!(endpoint.host, "10.0.0.5");
    assert_eq!(endpoint.port, 7420);
    assert!(endpoint.ipv4_only);

    assert_eq!(cfg.get_u64("channels.count", 0), 2);
    assert_eq!(cfg.get_string("channels.1.format", "rgb"), "rgbw");
}

#[test]
fn test_missing_identity_is_rejected() {
    let file = write_config("[remote.server]\naddress = \"host\"\n");
    let cfg = Config::load(file.path()).unwrap();
    assert!(cfg.get_string_required("id.uuid").is_err());
}
