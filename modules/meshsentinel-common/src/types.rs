use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Radio band. `Band5Alt` covers routers that expose a second 5 GHz radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Band24,
    Band5,
    Band5Alt,
    Band6,
}

impl Band {
    /// Centre frequency in MHz for a given channel number on this band.
    /// Used by `overlap_with_zigbee` in the spectrum analyser; kept here
    /// since it's a property of the band/channel pair, not the analyser.
    pub fn centre_freq_mhz(self, channel: u16) -> f64 {
        match self {
            Band::Band24 => 2407.0 + 5.0 * channel as f64,
            Band::Band5 | Band::Band5Alt => 5000.0 + 5.0 * channel as f64,
            Band::Band6 => 5950.0 + 5.0 * channel as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backhaul {
    Wired,
    Wireless,
}

/// A Wi-Fi access point in the mesh. Exactly one `Node` in a
/// `NetworkSnapshot` has `is_primary == true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub hw_address: String,
    pub address: IpAddr,
    pub is_primary: bool,
    pub backhaul: Backhaul,
    pub firmware: String,
    pub uptime_secs: u64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub connected_clients: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelWidth {
    W20,
    W40,
    W80,
    W160,
    W320,
}

impl ChannelWidth {
    pub fn mhz(self) -> u16 {
        match self {
            ChannelWidth::W20 => 20,
            ChannelWidth::W40 => 40,
            ChannelWidth::W80 => 80,
            ChannelWidth::W160 => 160,
            ChannelWidth::W320 => 320,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadioFeatures {
    pub band_steering: bool,
    pub beamforming: bool,
    pub mu_mimo: bool,
    pub ofdma: bool,
    pub roaming_assist: bool,
}

/// A per-node per-band radio configuration. `channel` must belong to
/// `ChannelPlan::valid_channels(band)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Radio {
    pub node_id: String,
    pub band: Band,
    pub channel: u16,
    pub width: ChannelWidth,
    pub tx_power_percent: u8,
    pub standard: String,
    pub security: String,
    pub features: RadioFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    Wired,
    Wireless2g,
    Wireless5g,
    Wireless6g,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Unstable,
    Offline,
}

/// A Wi-Fi or wired client. `attached_node` must refer to a `Node.id`
/// present in the same `NetworkSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub hw_address: String,
    pub last_ipv4: Option<std::net::Ipv4Addr>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub link: Link,
    pub attached_node: String,
    pub status: DeviceStatus,
    pub last_rssi: Option<i32>,
    pub disconnect_count: u32,
}

/// An immutable RSSI observation. Append-only; see `SignalStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSample {
    pub timestamp: DateTime<Utc>,
    pub device_addr: String,
    pub node_addr: String,
    pub rssi: i32,
    pub channel: Option<u16>,
    pub width_mhz: Option<u16>,
    pub rate_mbps: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZigbeeRole {
    Coordinator,
    Router,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZigbeeDevice {
    pub ieee_address: String,
    pub role: ZigbeeRole,
    pub last_lqi: Option<u8>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZigbeeNetwork {
    /// Coordinator channel, in `11..=26`.
    pub coordinator_channel: u8,
    pub devices: Vec<ZigbeeDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborAp {
    /// Empty string means a hidden SSID.
    pub ssid: String,
    pub bssid: String,
    pub channel: u16,
    pub band: Band,
    pub rssi: i32,
    pub last_seen: DateTime<Utc>,
}

/// Operator-entered physical placement of one of our own `Node`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePosition {
    pub node_id: String,
    /// -1 basement, 0 ground, 1..N upper floors, i32::MAX used as a
    /// sentinel for "garden/outdoor" by convention in `is_outdoor_floor`.
    pub floor: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub coverage_radius_m: HashMap<Band, f64>,
    pub outdoor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationMethod {
    Single,
    Bilateration,
    Trilateration,
}

/// A derived device position, solved by the `Triangulator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePosition {
    pub device_addr: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub floor: i32,
    pub confidence: f32,
    pub method: TriangulationMethod,
    pub contributing_readings: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    Channel,
    Roaming,
    Power,
    Zigbee,
    FeatureToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// A single proposed optimisation, bound to a one-use confirmation
/// token. Lives only while `snapshot_timestamp` is still the most recent
/// snapshot's timestamp — see `Suggestion::is_stale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub token: String,
    pub priority: i32,
    pub category: SuggestionCategory,
    pub current_value: String,
    pub target_value: String,
    pub risk: Risk,
    pub expected_improvement: String,
    pub affected_devices: Vec<String>,
    /// Timestamp of the `NetworkSnapshot` that generated this suggestion.
    pub snapshot_timestamp: DateTime<Utc>,
    /// Node/radio this suggestion acts on, so `apply` knows which
    /// DeviceShell/HubClient call to make.
    pub action: SuggestionAction,
}

impl Suggestion {
    /// A suggestion is stale once a newer snapshot has been published.
    pub fn is_stale(&self, latest_snapshot_timestamp: DateTime<Utc>) -> bool {
        latest_snapshot_timestamp > self.snapshot_timestamp
    }
}

/// The concrete change a `Suggestion` will make when applied. Kept as a
/// closed enum (not an opaque parameter bag) per the "heterogeneous
/// pendingOptimizations map" redesign flag in spec §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SuggestionAction {
    SetChannel {
        node_id: String,
        band: Band,
        channel: u16,
        restart_radio: bool,
    },
    ToggleFeature {
        node_id: String,
        band: Band,
        feature: String,
        enable: bool,
    },
    SetBackhaul {
        node_id: String,
        wired: bool,
    },
    DisableApFeature {
        node_id: String,
        feature: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub router_available: bool,
    pub hub_available: bool,
    pub snmp_available: bool,
    /// Human-readable failure reason per source, when unavailable.
    pub errors: HashMap<String, String>,
}

/// Immutable aggregate of the network state produced by one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub radios: Vec<Radio>,
    pub devices: Vec<Device>,
    pub neighbor_aps: Vec<NeighborAp>,
    pub zigbee: Option<ZigbeeNetwork>,
    pub source_health: SourceHealth,
}

impl NetworkSnapshot {
    pub fn primary_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_primary)
    }

    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Invariant check for spec §8: every device's `attached_node` must
    /// refer to a node present in this snapshot.
    pub fn devices_with_dangling_attachment(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| self.node_by_id(&d.attached_node).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthScore {
    pub overall: u8,
    pub signal: u8,
    pub channel: u8,
    pub zigbee: u8,
    pub interference: u8,
    pub stability: u8,
}
