use std::collections::HashMap;
use std::sync::RwLock;

use meshsentinel_common::NodePosition;

/// Operator-supplied mesh node placements, keyed by `node_id` (spec §4.6's
/// `setNodePosition3D`/`getNodePositions` actions). Kept separate from
/// `SignalStore` since positions are rarely-written configuration, not
/// an append-only measurement stream.
pub struct NodePositionStore {
    positions: RwLock<HashMap<String, NodePosition>>,
}

impl NodePositionStore {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace one node's position. Returns the prior value, if
    /// any, so callers can detect a correction vs. a first-time set.
    pub fn set(&self, position: NodePosition) -> Option<NodePosition> {
        self.positions
            .write()
            .unwrap()
            .insert(position.node_id.clone(), position)
    }

    pub fn get(&self, node_id: &str) -> Option<NodePosition> {
        self.positions.read().unwrap().get(node_id).cloned()
    }

    pub fn remove(&self, node_id: &str) -> Option<NodePosition> {
        self.positions.write().unwrap().remove(node_id)
    }

    /// All known positions, keyed by `node_id` — the shape the
    /// `Triangulator` and `infer_walls` take as input.
    pub fn all(&self) -> HashMap<String, NodePosition> {
        self.positions.read().unwrap().clone()
    }
}

impl Default for NodePositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsentinel_common::Band;

    fn position(node_id: &str, x: f64, y: f64) -> NodePosition {
        NodePosition {
            node_id: node_id.to_string(),
            floor: 0,
            x,
            y,
            z: 0.0,
            coverage_radius_m: HashMap::from([(Band::Band5, 15.0)]),
            outdoor: false,
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = NodePositionStore::new();
        store.set(position("n1", 1.0, 2.0));
        let fetched = store.get("n1").unwrap();
        assert_eq!(fetched.x, 1.0);
        assert_eq!(fetched.y, 2.0);
    }

    #[test]
    fn set_replaces_and_returns_prior() {
        let store = NodePositionStore::new();
        store.set(position("n1", 1.0, 2.0));
        let prior = store.set(position("n1", 3.0, 4.0));
        assert_eq!(prior.unwrap().x, 1.0);
        assert_eq!(store.get("n1").unwrap().x, 3.0);
    }

    #[test]
    fn all_reflects_every_set_node() {
        let store = NodePositionStore::new();
        store.set(position("n1", 0.0, 0.0));
        store.set(position("n2", 5.0, 5.0));
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn unknown_node_is_none() {
        let store = NodePositionStore::new();
        assert!(store.get("ghost").is_none());
    }
}
