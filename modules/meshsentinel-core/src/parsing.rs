//! Parsing for the router-side commands `SnapshotBuilder` drives over
//! `DeviceShell`/`NodePool`.
//!
//! Spec §4.1 leaves "command output parsing" to the caller and §1's
//! Non-goals exclude "the bit-layout of the shell-driven router
//! configuration keys" — so rather than inventing a bespoke text format
//! per command, MeshSentinel standardises on one JSON wire convention:
//! `system info`, `radio info` and `client list` each return one JSON
//! document on the router's side, which these functions deserialize and
//! canonicalise. `mesh peers` stays the angle-bracket record format
//! (`meshsentinel_deviceshell::parse_membership`) since that shape is
//! given verbatim by spec §4.2. Neighbor-scan output keeps its own two
//! text formats, handled by `SpectrumAnalyser::parse_neighbor_scan`.

use meshsentinel_common::{
    canonical_hw_address, Backhaul, Device, DeviceStatus, Link, MeshError, MeshResult, Node,
    Radio,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawSystemInfo {
    hw_address: String,
    address: String,
    firmware: String,
    uptime_secs: u64,
    cpu_percent: f32,
    memory_percent: f32,
    connected_clients: u32,
    #[serde(default)]
    wired_backhaul: bool,
    #[serde(default)]
    ap_mode: bool,
}

/// Whether the device is acting as a plain access point rather than the
/// network's gateway (spec §4.9's "AP-mode cleanup" rule). Defaults to
/// `false` on any parse failure rather than propagating an error, since
/// this is a secondary reading off the same document `parse_system_info`
/// already validates.
pub fn parse_ap_mode(raw: &str) -> bool {
    serde_json::from_str::<RawSystemInfo>(raw).map(|info| info.ap_mode).unwrap_or(false)
}

/// Parse the JSON array returned by `wan features` into the set of
/// currently-enabled WAN-only feature names. Absence or malformed output
/// yields an empty set rather than failing the scan phase.
pub fn parse_enabled_wan_features(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Parse `system info`'s JSON document into this node's `Node` record.
/// `node_id` and `is_primary` come from the caller's view of the
/// topology, not from the device output itself.
pub fn parse_system_info(raw: &str, node_id: &str, is_primary: bool) -> MeshResult<Node> {
    let info: RawSystemInfo = serde_json::from_str(raw).map_err(|_| MeshError::parse(raw))?;
    let address = info
        .address
        .parse()
        .map_err(|_| MeshError::parse(&info.address))?;
    Ok(Node {
        id: node_id.to_string(),
        hw_address: canonical_hw_address(&info.hw_address),
        address,
        is_primary,
        backhaul: if info.wired_backhaul { Backhaul::Wired } else { Backhaul::Wireless },
        firmware: info.firmware,
        uptime_secs: info.uptime_secs,
        cpu_percent: info.cpu_percent,
        memory_percent: info.memory_percent,
        connected_clients: info.connected_clients,
    })
}

#[derive(Debug, Deserialize)]
struct RawRadio {
    band: meshsentinel_common::Band,
    channel: u16,
    width: meshsentinel_common::ChannelWidth,
    tx_power_percent: u8,
    standard: String,
    security: String,
    #[serde(default)]
    features: meshsentinel_common::RadioFeatures,
}

/// Parse `radio info`'s JSON array into this node's `Radio` records.
pub fn parse_radio_info(raw: &str, node_id: &str) -> MeshResult<Vec<Radio>> {
    let radios: Vec<RawRadio> = serde_json::from_str(raw).map_err(|_| MeshError::parse(raw))?;
    Ok(radios
        .into_iter()
        .map(|r| Radio {
            node_id: node_id.to_string(),
            band: r.band,
            channel: r.channel,
            width: r.width,
            tx_power_percent: r.tx_power_percent,
            standard: r.standard,
            security: r.security,
            features: r.features,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct RawClient {
    hw_address: String,
    #[serde(default)]
    last_ipv4: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    link: Link,
    #[serde(default)]
    status: Option<DeviceStatus>,
    #[serde(default)]
    last_rssi: Option<i32>,
    #[serde(default)]
    disconnect_count: u32,
}

/// Parse a per-radio `client list`'s JSON array into `Device` records
/// attached to `node_id`. A client whose `status` is omitted defaults to
/// `Online` — the router only lists currently-associated clients.
pub fn parse_client_list(raw: &str, node_id: &str) -> MeshResult<Vec<Device>> {
    let clients: Vec<RawClient> = serde_json::from_str(raw).map_err(|_| MeshError::parse(raw))?;
    clients
        .into_iter()
        .map(|c| {
            let last_ipv4 = match c.last_ipv4 {
                Some(s) => Some(s.parse().map_err(|_| MeshError::parse(&s))?),
                None => None,
            };
            Ok(Device {
                hw_address: canonical_hw_address(&c.hw_address),
                last_ipv4,
                hostname: c.hostname,
                vendor: c.vendor,
                link: c.link,
                attached_node: node_id.to_string(),
                status: c.status.unwrap_or(DeviceStatus::Online),
                last_rssi: c.last_rssi,
                disconnect_count: c.disconnect_count,
            })
        })
        .collect()
}

/// Parse the plain-text reply to `rssi <hw_address>` issued against a
/// peer shell during cross-node measurement (spec §4.8). The router
/// prints a bare integer, or an empty line if it has no reading for
/// that client.
pub fn parse_rssi_reply(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

/// Parse a hub `zha/network/info` JSON payload into a `ZigbeeNetwork`,
/// joining in the device roster from a separate `zha/devices` payload.
pub fn parse_zigbee_network(
    network_value: &serde_json::Value,
    devices_value: &serde_json::Value,
) -> MeshResult<meshsentinel_common::ZigbeeNetwork> {
    let coordinator_channel = network_value
        .get("coordinator_channel")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| MeshError::parse(network_value.to_string()))? as u8;

    let devices: Vec<meshsentinel_common::ZigbeeDevice> = serde_json::from_value(devices_value.clone())
        .map_err(|_| MeshError::parse(devices_value.to_string()))?;

    Ok(meshsentinel_common::ZigbeeNetwork {
        coordinator_channel,
        devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_system_info_json() {
        let raw = r#"{
            "hw_address": "AA-BB-CC-DD-EE-FF",
            "address": "10.0.0.1",
            "firmware": "3.2.1",
            "uptime_secs": 86400,
            "cpu_percent": 12.5,
            "memory_percent": 40.0,
            "connected_clients": 6,
            "wired_backhaul": true
        }"#;
        let node = parse_system_info(raw, "n1", true).unwrap();
        assert_eq!(node.hw_address, "aa:bb:cc:dd:ee:ff");
        assert_eq!(node.backhaul, Backhaul::Wired);
        assert!(node.is_primary);
    }

    #[test]
    fn malformed_system_info_is_parse_error() {
        let err = parse_system_info("not json", "n1", true).unwrap_err();
        assert!(matches!(err, MeshError::Parse { .. }));
    }

    #[test]
    fn parses_rssi_reply() {
        assert_eq!(parse_rssi_reply("-61\n"), Some(-61));
        assert_eq!(parse_rssi_reply(""), None);
    }

    #[test]
    fn ap_mode_defaults_false_on_malformed_input() {
        assert!(!parse_ap_mode("garbage"));
    }

    #[test]
    fn parses_enabled_wan_features() {
        let features = parse_enabled_wan_features(r#"["qos", "upnp"]"#);
        assert_eq!(features, vec!["qos".to_string(), "upnp".to_string()]);
        assert!(parse_enabled_wan_features("garbage").is_empty());
    }

    #[test]
    fn parses_zigbee_network_joined_with_devices() {
        let network = serde_json::json!({ "coordinator_channel": 15 });
        let devices = serde_json::json!([
            { "ieee_address": "00:11", "role": "coordinator", "last_lqi": 255, "available": true }
        ]);
        let zn = parse_zigbee_network(&network, &devices).unwrap();
        assert_eq!(zn.coordinator_channel, 15);
        assert_eq!(zn.devices.len(), 1);
    }
}
