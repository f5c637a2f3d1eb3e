use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchPort {
    pub index: u32,
    pub description: String,
    pub up: bool,
    pub vlan: Option<u32>,
    pub poe_watts: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanEntry {
    pub id: u32,
    pub name: String,
}

/// One host's walk outcome. `status` is `None` when the host never
/// answered (spec §4.4: "null status if the host does not respond");
/// OIDs the device doesn't implement simply contribute an empty vector
/// rather than failing the whole walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub host: String,
    pub ports: Vec<SwitchPort>,
    pub vlans: Vec<VlanEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchWalkResult {
    pub host: String,
    pub status: Option<SwitchStatus>,
}
