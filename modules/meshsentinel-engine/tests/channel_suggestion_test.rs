//! Literal scenario: a 2.4 GHz radio stuck on channel 6 with seven
//! neighbors crowding it and a clean offset from the Zigbee coordinator
//! channel proposes channel 11 at priority >= 8.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use chrono::Utc;
use meshsentinel_common::{Backhaul, Band, NetworkSnapshot, Node, SourceHealth};
use meshsentinel_engine::rules::{channel_change, RuleInputs};
use meshsentinel_signal::ChannelRecommendation;

fn primary_node() -> Node {
    Node {
        id: "primary".to_string(),
        hw_address: "aa:bb:cc:dd:ee:01".to_string(),
        address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        is_primary: true,
        backhaul: Backhaul::Wired,
        firmware: "1.0".to_string(),
        uptime_secs: 3600,
        cpu_percent: 10.0,
        memory_percent: 20.0,
        connected_clients: 7,
    }
}

fn snapshot() -> NetworkSnapshot {
    NetworkSnapshot {
        timestamp: Utc::now(),
        nodes: vec![primary_node()],
        radios: Vec::new(),
        devices: Vec::new(),
        neighbor_aps: Vec::new(),
        zigbee: None,
        source_health: SourceHealth {
            router_available: true,
            hub_available: true,
            snmp_available: true,
            errors: HashMap::new(),
        },
    }
}

#[test]
fn crowded_channel_with_clean_zigbee_offset_proposes_eleven_at_high_priority() {
    let snapshot = snapshot();
    let recommendation = ChannelRecommendation {
        band: Band::Band24,
        current_channel: 6,
        best_channel: 11,
        current_score: 18.0,
        best_score: 70.0,
        improvement: 52.0,
    };
    let inputs = RuleInputs {
        snapshot: &snapshot,
        channel_recommendations: &[recommendation],
        zigbee_channel: Some(15),
        backhaul_rssi: &HashMap::new(),
        primary_is_ap_mode: false,
        enabled_wan_features: &[],
    };

    let candidates = channel_change(&inputs);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].target_value, "11");
    assert!(candidates[0].priority >= 8, "priority was {}", candidates[0].priority);
}
