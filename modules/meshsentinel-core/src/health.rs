//! Environment/health scoring (spec §4.8 step 5): a 0-100 composite of
//! wifi-health, spectrum-clarity, cross-protocol-harmony and stability,
//! in the same closed-form, clamped-float style as the channel scorer.

use meshsentinel_common::{Device, DeviceStatus, HealthScore, NetworkSnapshot};
use meshsentinel_signal::ChannelRecommendation;

/// Below this RSSI a connected device counts against wifi-health.
const WEAK_SIGNAL_RSSI_DBM: i32 = -75;

/// Compute the composite `HealthScore` for one snapshot.
///
/// `channel_recs` are the current `SpectrumAnalyser::recommend_channel`
/// outputs for whichever bands were scanned; `zigbee_overlap` is the
/// current-channel overlap value from the Zigbee-protection rule, when a
/// Zigbee network is present.
pub fn compute_health_score(
    snapshot: &NetworkSnapshot,
    channel_recs: &[ChannelRecommendation],
    zigbee_overlap: Option<f64>,
) -> HealthScore {
    let signal = wifi_health(&snapshot.devices);
    let channel = spectrum_clarity(channel_recs);
    let zigbee = cross_protocol_harmony(zigbee_overlap);
    let interference = interference_score(channel_recs);
    let stability = stability_score(snapshot);

    let overall = ((signal as u32 + channel as u32 + zigbee as u32 + interference as u32 + stability as u32) / 5) as u8;

    HealthScore {
        overall,
        signal,
        channel,
        zigbee,
        interference,
        stability,
    }
}

/// Fraction of wireless, online devices with acceptable RSSI, scaled to
/// 0-100. A snapshot with no wireless devices scores neutral (80): there's
/// nothing to penalise, but it isn't evidence of a healthy radio either.
fn wifi_health(devices: &[Device]) -> u8 {
    let wireless: Vec<&Device> = devices
        .iter()
        .filter(|d| !matches!(d.link, meshsentinel_common::Link::Wired))
        .collect();
    if wireless.is_empty() {
        return 80;
    }

    let healthy = wireless
        .iter()
        .filter(|d| {
            d.status != DeviceStatus::Offline && d.last_rssi.map(|r| r >= WEAK_SIGNAL_RSSI_DBM).unwrap_or(true)
        })
        .count();

    ((healthy as f64 / wireless.len() as f64) * 100.0).round() as u8
}

/// Average per-band channel score, normalised against the realistic
/// ceiling used by `SpectrumAnalyser::score_channel` (100 minus
/// penalties, rarely above ~90 in a crowded environment).
fn spectrum_clarity(channel_recs: &[ChannelRecommendation]) -> u8 {
    if channel_recs.is_empty() {
        return 80;
    }
    let avg: f64 = channel_recs.iter().map(|r| r.current_score).sum::<f64>() / channel_recs.len() as f64;
    avg.clamp(0.0, 100.0).round() as u8
}

/// 100 when there's no Zigbee network to protect, degrading linearly as
/// the current Wi-Fi/Zigbee channel overlap grows (spec §4.9 guard of
/// 0.3 is the point this should already have prompted a suggestion).
fn cross_protocol_harmony(zigbee_overlap: Option<f64>) -> u8 {
    match zigbee_overlap {
        None => 100,
        Some(overlap) => ((1.0 - overlap.clamp(0.0, 1.0)) * 100.0).round() as u8,
    }
}

/// Penalise channels whose best-vs-current improvement is large: a big
/// improvement available means the current layout is leaving
/// interference on the table.
fn interference_score(channel_recs: &[ChannelRecommendation]) -> u8 {
    if channel_recs.is_empty() {
        return 80;
    }
    let max_improvement = channel_recs.iter().map(|r| r.improvement).fold(0.0, f64::max);
    (100.0 - max_improvement.clamp(0.0, 100.0)).round() as u8
}

/// Penalise low uptime and high disconnect counts across nodes/devices.
fn stability_score(snapshot: &NetworkSnapshot) -> u8 {
    if snapshot.nodes.is_empty() {
        return 0;
    }
    let min_uptime_hours = snapshot
        .nodes
        .iter()
        .map(|n| n.uptime_secs as f64 / 3600.0)
        .fold(f64::INFINITY, f64::min);
    let uptime_component = (min_uptime_hours / 24.0 * 100.0).clamp(0.0, 100.0);

    let total_disconnects: u32 = snapshot.devices.iter().map(|d| d.disconnect_count).sum();
    let disconnect_penalty = (total_disconnects as f64 * 2.0).min(60.0);

    (uptime_component - disconnect_penalty).clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshsentinel_common::{Backhaul, Link, Node, SourceHealth};

    fn node(uptime_secs: u64) -> Node {
        Node {
            id: "n1".to_string(),
            hw_address: "aa:bb:cc:dd:ee:ff".to_string(),
            address: "10.0.0.1".parse().unwrap(),
            is_primary: true,
            backhaul: Backhaul::Wired,
            firmware: "1.0".to_string(),
            uptime_secs,
            cpu_percent: 10.0,
            memory_percent: 10.0,
            connected_clients: 2,
        }
    }

    fn device(rssi: Option<i32>, status: DeviceStatus, disconnects: u32) -> Device {
        Device {
            hw_address: "11:22:33:44:55:66".to_string(),
            last_ipv4: None,
            hostname: None,
            vendor: None,
            link: Link::Wireless5g,
            attached_node: "n1".to_string(),
            status,
            last_rssi: rssi,
            disconnect_count: disconnects,
        }
    }

    #[test]
    fn healthy_snapshot_scores_high_overall() {
        let snapshot = NetworkSnapshot {
            timestamp: Utc::now(),
            nodes: vec![node(72 * 3600)],
            radios: Vec::new(),
            devices: vec![device(Some(-50), DeviceStatus::Online, 0)],
            neighbor_aps: Vec::new(),
            zigbee: None,
            source_health: SourceHealth::default(),
        };
        let score = compute_health_score(&snapshot, &[], None);
        assert!(score.signal >= 90);
        assert!(score.overall >= 80);
    }

    #[test]
    fn weak_signal_devices_drag_down_wifi_health() {
        let snapshot = NetworkSnapshot {
            timestamp: Utc::now(),
            nodes: vec![node(3600)],
            radios: Vec::new(),
            devices: vec![device(Some(-90), DeviceStatus::Unstable, 5)],
            neighbor_aps: Vec::new(),
            zigbee: None,
            source_health: SourceHealth::default(),
        };
        let score = compute_health_score(&snapshot, &[], None);
        assert_eq!(score.signal, 0);
    }

    #[test]
    fn zigbee_overlap_lowers_cross_protocol_harmony() {
        assert_eq!(cross_protocol_harmony(None), 100);
        assert_eq!(cross_protocol_harmony(Some(0.5)), 50);
        assert_eq!(cross_protocol_harmony(Some(1.0)), 0);
    }
}
