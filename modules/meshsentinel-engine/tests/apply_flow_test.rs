//! Literal scenario: `optimizationSuggestions` returns a token among its
//! results; `apply(token, confirm=false)` echoes pending without consuming
//! it; `apply(token, confirm=true)` commits; a second confirmed apply of
//! the same token returns `UnknownSuggestionError`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use meshsentinel_common::{Backhaul, Band, MeshError, MeshResult, Node, NetworkSnapshot, SourceHealth};
use meshsentinel_engine::{ApplyOutcome, OptimisationTarget, RadioController, RecommendationEngine, RuleInputs};

struct RecordingController;

#[async_trait]
impl RadioController for RecordingController {
    async fn set_channel(&self, _node_id: &str, _band: Band, _channel: u16) -> MeshResult<()> {
        Ok(())
    }
    async fn toggle_feature(&self, _node_id: &str, _band: Band, _feature: &str, _enable: bool) -> MeshResult<()> {
        Ok(())
    }
    async fn set_backhaul(&self, _node_id: &str, _wired: bool) -> MeshResult<()> {
        Ok(())
    }
    async fn disable_ap_feature(&self, _node_id: &str, _feature: &str) -> MeshResult<()> {
        Ok(())
    }
    async fn restart_radio(&self, _node_id: &str) -> MeshResult<()> {
        Ok(())
    }
}

fn snapshot_with_ap_mode() -> NetworkSnapshot {
    NetworkSnapshot {
        timestamp: Utc::now(),
        nodes: vec![Node {
            id: "primary".to_string(),
            hw_address: "aa:bb:cc:dd:ee:01".to_string(),
            address: "192.168.1.1".parse().unwrap(),
            is_primary: true,
            backhaul: Backhaul::Wired,
            firmware: "1.0".to_string(),
            uptime_secs: 3600,
            cpu_percent: 10.0,
            memory_percent: 20.0,
            connected_clients: 3,
        }],
        radios: Vec::new(),
        devices: Vec::new(),
        neighbor_aps: Vec::new(),
        zigbee: None,
        source_health: SourceHealth::default(),
    }
}

#[tokio::test]
async fn full_apply_flow_matches_the_literal_scenario() {
    let engine = RecommendationEngine::new();
    let snapshot = snapshot_with_ap_mode();
    let inputs = RuleInputs {
        snapshot: &snapshot,
        channel_recommendations: &[],
        zigbee_channel: None,
        backhaul_rssi: &HashMap::new(),
        primary_is_ap_mode: true,
        enabled_wan_features: &["qos".to_string()],
    };

    let suggestions = engine.generate(&inputs, &[OptimisationTarget::BalanceCoverage]);
    assert_eq!(suggestions.len(), 1);
    let token = suggestions[0].token.clone();

    let controller = RecordingController;
    let now = Utc::now();

    let pending = engine.apply(&token, false, &controller, now).await.unwrap();
    assert!(matches!(pending, ApplyOutcome::Pending(_)));

    let applied = engine.apply(&token, true, &controller, now).await.unwrap();
    assert!(matches!(applied, ApplyOutcome::Applied { .. }));

    let repeat = engine.apply(&token, true, &controller, now).await.unwrap_err();
    assert!(matches!(repeat, MeshError::UnknownSuggestion(_)));
}
