//! Integration tests for the smarthub-common decoders against captured
//! router payloads.

use smarthub_common::{
    ConnectionDetails, DecodeErrorKind, Device, decode_lan_payload, decode_nested_first,
    decode_wan_payload,
};

const WAN_FIXTURE: &[u8] = include_bytes!("fixtures/wan_conn.xml");
const LAN_FIXTURE: &[u8] = include_bytes!("fixtures/lan.js");

#[test]
fn test_wan_fixture() {
    let details = decode_wan_payload(WAN_FIXTURE).expect("WAN decode failed");

    assert_eq!(
        details,
        ConnectionDetails {
            is_connected: true,
            uptime_seconds: 1159340,
            downloaded_bytes: 336463954090,
            uploaded_bytes: 34683717318,
            download_rate_bps: 1000000000,
            upload_rate_bps: 1000000000,
        }
    );
}

#[test]
fn test_wan_fixture_disconnected() {
    let xml = String::from_utf8(WAN_FIXTURE.to_vec())
        .unwrap()
        .replace("connected%3BFTTP", "disconnected%3BFTTP");

    let details = decode_wan_payload(xml.as_bytes()).expect("WAN decode failed");
    assert!(!details.is_connected);
    assert_eq!(details.downloaded_bytes, 336463954090);
}

#[test]
fn test_wan_fixture_missing_rate() {
    let xml = String::from_utf8(WAN_FIXTURE.to_vec())
        .unwrap()
        .replace("status_rate", "status_rate_old");

    let err = decode_wan_payload(xml.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::Structure);
}

#[test]
fn test_nested_decode_known_payload() {
    let fields = decode_nested_first("[['86.1.2.3%3B255.255.255.255%3B%3Bend'], null]").unwrap();
    assert_eq!(fields, vec!["86.1.2.3", "255.255.255.255", "", "end"]);
}

#[test]
fn test_lan_fixture() {
    let devices = decode_lan_payload(LAN_FIXTURE).expect("LAN decode failed");

    assert_eq!(
        devices,
        vec![
            Device {
                mac: "E4:F0:42:81:F6:30".to_string(),
                hostname: "Chromecast".to_string(),
                ip: "192.168.0.71".to_string(),
                downloaded_bytes: 0,
                uploaded_bytes: 0,
            },
            Device {
                mac: "F8:32:E4:9E:A4:89".to_string(),
                hostname: "jl-quail-1".to_string(),
                ip: "192.168.0.107".to_string(),
                downloaded_bytes: 8765641,
                uploaded_bytes: 1313609,
            },
        ]
    );
}

#[test]
fn test_lan_macs_are_canonical() {
    let devices = decode_lan_payload(LAN_FIXTURE).unwrap();

    for device in &devices {
        let octets: Vec<&str> = device.mac.split(':').collect();
        assert_eq!(octets.len(), 6, "mac: {}", device.mac);
        assert!(
            octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())),
            "mac: {}",
            device.mac
        );
    }
}

#[test]
fn test_lan_trailing_null_does_not_change_result() {
    let with_null = decode_lan_payload(LAN_FIXTURE).unwrap();
    let script = String::from_utf8(LAN_FIXTURE.to_vec())
        .unwrap()
        .replace(",\nnull];", "];");

    let without_null = decode_lan_payload(script.as_bytes()).unwrap();
    assert_eq!(with_null, without_null);
}

#[test]
fn test_lan_truncated_payload() {
    let truncated = &LAN_FIXTURE[..LAN_FIXTURE.len() / 2];
    let err = decode_lan_payload(truncated).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::Format);
}
