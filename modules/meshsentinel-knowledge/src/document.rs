use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use meshsentinel_common::NetworkSnapshot;
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: u32 = 1;
const DEFAULT_SNAPSHOT_RING_CAP: usize = 200;
const DEFAULT_EVENT_RING_CAP: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub hw_address: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub disconnect_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshNodeRecord {
    pub node_id: String,
    pub hw_address: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpDeviceRecord {
    pub host: String,
    pub first_seen: DateTime<Utc>,
    pub last_responded: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZigbeeDeviceRecord {
    pub ieee_address: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub hw_address: String,
    pub kind: ConnectionEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
    Roamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisationRecord {
    pub token: String,
    pub applied_at: DateTime<Utc>,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    pub snapshot_ring_cap: usize,
    pub connection_event_ring_cap: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            snapshot_ring_cap: DEFAULT_SNAPSHOT_RING_CAP,
            connection_event_ring_cap: DEFAULT_EVENT_RING_CAP,
        }
    }
}

/// The single JSON document persisted at `${dataDir}/network-knowledge.json`
/// (spec §6). Every field here round-trips through serde so a partial or
/// missing document still loads with sane empty defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub version: u32,
    pub network_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub device_profiles: HashMap<String, DeviceProfile>,
    pub mesh_nodes: HashMap<String, MeshNodeRecord>,
    pub snmp_devices: HashMap<String, SnmpDeviceRecord>,
    pub zigbee_devices: HashMap<String, ZigbeeDeviceRecord>,
    pub snapshots: VecDeque<NetworkSnapshot>,
    pub connection_events: VecDeque<ConnectionEvent>,
    pub optimisation_history: Vec<OptimisationRecord>,
    pub retention: RetentionSettings,
}

impl KnowledgeDocument {
    pub fn new(network_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: DOCUMENT_VERSION,
            network_id: network_id.into(),
            created_at: now,
            updated_at: now,
            device_profiles: HashMap::new(),
            mesh_nodes: HashMap::new(),
            snmp_devices: HashMap::new(),
            zigbee_devices: HashMap::new(),
            snapshots: VecDeque::new(),
            connection_events: VecDeque::new(),
            optimisation_history: Vec::new(),
            retention: RetentionSettings::default(),
        }
    }

    pub fn push_snapshot(&mut self, snapshot: NetworkSnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.retention.snapshot_ring_cap {
            self.snapshots.pop_front();
        }
    }

    pub fn push_connection_event(&mut self, event: ConnectionEvent) {
        self.connection_events.push_back(event);
        while self.connection_events.len() > self.retention.connection_event_ring_cap {
            self.connection_events.pop_front();
        }
    }

    pub fn record_optimisation(&mut self, record: OptimisationRecord) {
        self.optimisation_history.push(record);
    }

    pub fn touch_device(&mut self, hw_address: &str, hostname: Option<String>, vendor: Option<String>) {
        let now = Utc::now();
        let profile = self
            .device_profiles
            .entry(hw_address.to_string())
            .or_insert_with(|| DeviceProfile {
                hw_address: hw_address.to_string(),
                first_seen: now,
                last_seen: now,
                hostname: None,
                vendor: None,
                disconnect_count: 0,
            });
        profile.last_seen = now;
        if hostname.is_some() {
            profile.hostname = hostname;
        }
        if vendor.is_some() {
            profile.vendor = vendor;
        }
    }
}
