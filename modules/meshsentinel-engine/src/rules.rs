use std::collections::HashMap;

use meshsentinel_common::{Band, NetworkSnapshot, Risk, SuggestionAction, SuggestionCategory};
use meshsentinel_signal::{overlap_with_zigbee, ChannelRecommendation, CHANNEL_IMPROVEMENT_THRESHOLD_24GHZ, CHANNEL_IMPROVEMENT_THRESHOLD_5GHZ};

use crate::candidate::Candidate;
use crate::targets::OptimisationTarget;

const ZIGBEE_OVERLAP_GUARD: f64 = 0.3;
const BACKHAUL_RSSI_THRESHOLD_DBM: i32 = -70;

/// AP-only WAN features that waste CPU when the primary device isn't
/// acting as the network's gateway (spec §4.9 "AP-mode cleanup").
const WAN_ONLY_FEATURES: [&str; 6] = [
    "qos",
    "intrusion_detection",
    "traffic_analyser",
    "vpn_server",
    "ddns",
    "upnp",
];

pub struct RuleInputs<'a> {
    pub snapshot: &'a NetworkSnapshot,
    pub channel_recommendations: &'a [ChannelRecommendation],
    pub zigbee_channel: Option<u8>,
    pub backhaul_rssi: &'a HashMap<String, i32>,
    pub primary_is_ap_mode: bool,
    pub enabled_wan_features: &'a [String],
}

/// Channel change rule (spec §4.9): propose the best channel when the
/// deficit against it exceeds the band-dependent threshold, vetoing 2.4
/// GHz moves that would still overlap the Zigbee channel.
pub fn channel_change(inputs: &RuleInputs) -> Vec<Candidate> {
    let mut out = Vec::new();
    for rec in inputs.channel_recommendations {
        let threshold = match rec.band {
            Band::Band24 => CHANNEL_IMPROVEMENT_THRESHOLD_24GHZ,
            _ => CHANNEL_IMPROVEMENT_THRESHOLD_5GHZ,
        };
        if rec.improvement <= threshold {
            continue;
        }
        if rec.band == Band::Band24 {
            if let Some(zigbee) = inputs.zigbee_channel {
                if overlap_with_zigbee(rec.best_channel, zigbee) >= ZIGBEE_OVERLAP_GUARD {
                    continue;
                }
            }
        }

        let Some(node) = inputs.snapshot.primary_node() else {
            continue;
        };
        out.push(Candidate {
            priority: (rec.improvement / 5.0) as i32,
            confidence: (rec.improvement / 100.0).min(1.0) as f32,
            category: SuggestionCategory::Channel,
            current_value: rec.current_channel.to_string(),
            target_value: rec.best_channel.to_string(),
            risk: Risk::Low,
            expected_improvement: format!(
                "score {:.0} -> {:.0} (+{:.0})",
                rec.current_score, rec.best_score, rec.improvement
            ),
            affected_devices: Vec::new(),
            action: SuggestionAction::SetChannel {
                node_id: node.id.clone(),
                band: rec.band,
                channel: rec.best_channel,
                restart_radio: true,
            },
        });
    }
    out
}

/// Zigbee protection rule (spec §4.9): when the current 2.4 GHz channel
/// overlaps the Zigbee coordinator channel beyond the guard threshold,
/// move Wi-Fi rather than Zigbee, since Wi-Fi clients roam more readily.
pub fn zigbee_protection(inputs: &RuleInputs) -> Vec<Candidate> {
    let Some(zigbee) = inputs.zigbee_channel else {
        return Vec::new();
    };
    let Some(rec) = inputs
        .channel_recommendations
        .iter()
        .find(|r| r.band == Band::Band24)
    else {
        return Vec::new();
    };

    let current_overlap = overlap_with_zigbee(rec.current_channel, zigbee);
    if current_overlap <= ZIGBEE_OVERLAP_GUARD {
        return Vec::new();
    }

    let Some(node) = inputs.snapshot.primary_node() else {
        return Vec::new();
    };

    vec![Candidate {
        priority: 9,
        confidence: 0.9,
        category: SuggestionCategory::Zigbee,
        current_value: rec.current_channel.to_string(),
        target_value: rec.best_channel.to_string(),
        risk: Risk::Medium,
        expected_improvement: format!("Zigbee overlap {current_overlap:.2} -> reduced"),
        affected_devices: Vec::new(),
        action: SuggestionAction::SetChannel {
            node_id: node.id.clone(),
            band: Band::Band24,
            channel: rec.best_channel,
            restart_radio: true,
        },
    }]
}

/// Enable-feature rule (spec §4.9): propose flipping a disabled standard
/// feature on when the radio's conditions warrant it.
pub fn enable_feature(inputs: &RuleInputs) -> Vec<Candidate> {
    let mut out = Vec::new();
    for radio in &inputs.snapshot.radios {
        if radio.band != Band::Band24 && !radio.features.roaming_assist && inputs.snapshot.nodes.len() > 1 {
            out.push(feature_candidate(&radio.node_id, radio.band, "roaming_assist", true));
        }
        if matches!(radio.band, Band::Band5 | Band::Band5Alt) && !radio.features.mu_mimo {
            out.push(feature_candidate(&radio.node_id, radio.band, "mu_mimo", true));
        }
    }
    out
}

fn feature_candidate(node_id: &str, band: Band, feature: &str, enable: bool) -> Candidate {
    Candidate {
        priority: 4,
        confidence: 0.6,
        category: SuggestionCategory::FeatureToggle,
        current_value: (!enable).to_string(),
        target_value: enable.to_string(),
        risk: Risk::Low,
        expected_improvement: format!("enables {feature} on {band:?}"),
        affected_devices: Vec::new(),
        action: SuggestionAction::ToggleFeature {
            node_id: node_id.to_string(),
            band,
            feature: feature.to_string(),
            enable,
        },
    }
}

/// Wired-backhaul rule (spec §4.9): a wirelessly backhauled peer whose
/// estimated backhaul RSSI has dropped below threshold is a throughput
/// bottleneck; suggest switching it to wired.
pub fn wired_backhaul(inputs: &RuleInputs) -> Vec<Candidate> {
    inputs
        .snapshot
        .nodes
        .iter()
        .filter(|n| !n.is_primary && n.backhaul == meshsentinel_common::Backhaul::Wireless)
        .filter_map(|n| {
            let rssi = *inputs.backhaul_rssi.get(&n.id)?;
            if rssi >= BACKHAUL_RSSI_THRESHOLD_DBM {
                return None;
            }
            Some(Candidate {
                priority: 7,
                confidence: 0.7,
                category: SuggestionCategory::Roaming,
                current_value: "wireless".to_string(),
                target_value: "wired".to_string(),
                risk: Risk::Medium,
                expected_improvement: format!("backhaul rssi {rssi} dBm is below threshold"),
                affected_devices: Vec::new(),
                action: SuggestionAction::SetBackhaul {
                    node_id: n.id.clone(),
                    wired: true,
                },
            })
        })
        .collect()
}

/// AP-mode cleanup rule (spec §4.9): disable WAN-only features that
/// waste CPU when the primary device isn't acting as the gateway.
pub fn ap_mode_cleanup(inputs: &RuleInputs) -> Vec<Candidate> {
    if !inputs.primary_is_ap_mode {
        return Vec::new();
    }
    let Some(node) = inputs.snapshot.primary_node() else {
        return Vec::new();
    };

    WAN_ONLY_FEATURES
        .iter()
        .filter(|f| inputs.enabled_wan_features.iter().any(|enabled| enabled == **f))
        .map(|feature| Candidate {
            priority: 3,
            confidence: 0.8,
            category: SuggestionCategory::Power,
            current_value: "enabled".to_string(),
            target_value: "disabled".to_string(),
            risk: Risk::Low,
            expected_improvement: format!("frees CPU wasted on {feature} in AP mode"),
            affected_devices: Vec::new(),
            action: SuggestionAction::DisableApFeature {
                node_id: node.id.clone(),
                feature: feature.to_string(),
            },
        })
        .collect()
}

/// Runs every rule pack relevant to the requested targets. Rule packs
/// are independent and may emit overlapping candidates; dedup happens
/// downstream in `RecommendationEngine::generate`.
pub fn run_all(inputs: &RuleInputs, targets: &[OptimisationTarget]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let wants = |t: OptimisationTarget| targets.contains(&t);

    if wants(OptimisationTarget::MinimiseInterference) || wants(OptimisationTarget::ReduceNeighborOverlap) {
        out.extend(channel_change(inputs));
    }
    if wants(OptimisationTarget::ProtectZigbee) {
        out.extend(zigbee_protection(inputs));
    }
    if wants(OptimisationTarget::ImproveRoaming) || wants(OptimisationTarget::MaximiseThroughput) {
        out.extend(enable_feature(inputs));
        out.extend(wired_backhaul(inputs));
    }
    if wants(OptimisationTarget::BalanceCoverage) {
        out.extend(ap_mode_cleanup(inputs));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshsentinel_common::SourceHealth;
    use std::collections::HashMap as Map;
    use std::net::{IpAddr, Ipv4Addr};

    fn primary_node() -> meshsentinel_common::Node {
        meshsentinel_common::Node {
            id: "primary".to_string(),
            hw_address: "aa:bb:cc:dd:ee:01".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            is_primary: true,
            backhaul: meshsentinel_common::Backhaul::Wired,
            firmware: "1.0".to_string(),
            uptime_secs: 1000,
            cpu_percent: 10.0,
            memory_percent: 20.0,
            connected_clients: 5,
        }
    }

    fn empty_snapshot(nodes: Vec<meshsentinel_common::Node>) -> NetworkSnapshot {
        NetworkSnapshot {
            timestamp: Utc::now(),
            nodes,
            radios: Vec::new(),
            devices: Vec::new(),
            neighbor_aps: Vec::new(),
            zigbee: None,
            source_health: SourceHealth {
                router_available: true,
                hub_available: true,
                snmp_available: true,
                errors: Map::new(),
            },
        }
    }

    #[test]
    fn congested_channel_with_clean_zigbee_offset_proposes_channel_eleven() {
        let snapshot = empty_snapshot(vec![primary_node()]);
        let rec = ChannelRecommendation {
            band: Band::Band24,
            current_channel: 6,
            best_channel: 11,
            current_score: 20.0,
            best_score: 65.0,
            improvement: 45.0,
        };
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[rec],
            zigbee_channel: Some(15),
            backhaul_rssi: &Map::new(),
            primary_is_ap_mode: false,
            enabled_wan_features: &[],
        };

        let candidates = channel_change(&inputs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].target_value, "11");
        assert!(candidates[0].priority >= 8);
    }

    #[test]
    fn channel_change_below_improvement_threshold_is_dropped() {
        let snapshot = empty_snapshot(vec![primary_node()]);
        let rec = ChannelRecommendation {
            band: Band::Band24,
            current_channel: 6,
            best_channel: 11,
            current_score: 50.0,
            best_score: 55.0,
            improvement: 5.0,
        };
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[rec],
            zigbee_channel: None,
            backhaul_rssi: &Map::new(),
            primary_is_ap_mode: false,
            enabled_wan_features: &[],
        };
        assert!(channel_change(&inputs).is_empty());
    }

    #[test]
    fn zigbee_protection_fires_when_current_channel_overlaps() {
        let snapshot = empty_snapshot(vec![primary_node()]);
        let rec = ChannelRecommendation {
            band: Band::Band24,
            current_channel: 6,
            best_channel: 11,
            current_score: 10.0,
            best_score: 80.0,
            improvement: 70.0,
        };
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[rec],
            zigbee_channel: Some(15),
            backhaul_rssi: &Map::new(),
            primary_is_ap_mode: false,
            enabled_wan_features: &[],
        };
        let candidates = zigbee_protection(&inputs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, 9);
    }

    #[test]
    fn wired_backhaul_suggested_below_rssi_threshold() {
        let mut secondary = primary_node();
        secondary.id = "node2".to_string();
        secondary.is_primary = false;
        secondary.backhaul = meshsentinel_common::Backhaul::Wireless;
        let snapshot = empty_snapshot(vec![primary_node(), secondary]);
        let mut rssi = Map::new();
        rssi.insert("node2".to_string(), -80);
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[],
            zigbee_channel: None,
            backhaul_rssi: &rssi,
            primary_is_ap_mode: false,
            enabled_wan_features: &[],
        };
        let candidates = wired_backhaul(&inputs);
        assert_eq!(candidates.len(), 1);
        match &candidates[0].action {
            SuggestionAction::SetBackhaul { node_id, wired } => {
                assert_eq!(node_id, "node2");
                assert!(*wired);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
