//! Typed results of a scrape cycle.

use serde::{Deserialize, Serialize};

/// WAN link state decoded from `/nonAuth/wan_conn.xml`.
///
/// Built fresh for every scrape; nothing carries over between scrapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// Whether the WAN link is up.
    pub is_connected: bool,
    /// Router uptime in seconds.
    pub uptime_seconds: u64,
    /// Bytes downloaded over the current WAN connection. Resets on reconnect.
    pub downloaded_bytes: u64,
    /// Bytes uploaded over the current WAN connection. Resets on reconnect.
    pub uploaded_bytes: u64,
    /// Negotiated downstream link rate in bits/sec.
    pub download_rate_bps: u64,
    /// Negotiated upstream link rate in bits/sec.
    pub upload_rate_bps: u64,
}

/// A LAN device and its traffic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Canonical MAC address (`AA:BB:CC:DD:EE:FF`).
    pub mac: String,
    pub hostname: String,
    pub ip: String,
    /// Zero when the router reported no rate entry for this device.
    pub downloaded_bytes: u64,
    /// Zero when the router reported no rate entry for this device.
    pub uploaded_bytes: u64,
}
