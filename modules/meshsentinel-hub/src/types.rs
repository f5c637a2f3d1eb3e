use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An unsolicited `type=event` frame from the hub, fanned out to every
/// `Subscribe` stream matching its `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEntity {
    pub entity_id: String,
    pub state: String,
    pub attributes: Value,
}
