//! Turns a finished `NetworkSnapshot` + `HealthScore` into the `Problem`
//! stream `meshsentinel-alerts`' `AlertRouter` consumes and the
//! `problems` action surfaces directly (spec §2: "AlertRouter watches
//! problem streams derived from each snapshot").

use meshsentinel_alerts::{Problem, ProblemSeverity};
use meshsentinel_common::{DeviceStatus, HealthScore, Link, NetworkSnapshot};

/// RSSI below this counts a connected wireless device as weak signal,
/// matching `health::WEAK_SIGNAL_RSSI_DBM`.
const WEAK_SIGNAL_RSSI_DBM: i32 = -75;
const HIGH_CPU_PERCENT: f32 = 90.0;
const HIGH_MEMORY_PERCENT: f32 = 90.0;
const ZIGBEE_OVERLAP_GUARD: f64 = 0.3;
const LOW_SUBSCORE: u8 = 40;

/// Derive the current problem set from one snapshot and its health
/// score. Ordered by decreasing severity, then by detection order within
/// a severity so the first invariant violation always sorts first.
pub fn derive_problems(snapshot: &NetworkSnapshot, health: &HealthScore) -> Vec<Problem> {
    let mut problems = Vec::new();
    let now = snapshot.timestamp;

    for device in snapshot.devices_with_dangling_attachment() {
        problems.push(Problem {
            key: format!("device:{}:dangling-attachment", device.hw_address),
            severity: ProblemSeverity::Critical,
            summary: format!("{} is attached to an unknown node", device.hw_address),
            detail: format!(
                "attached_node {:?} does not match any node in this snapshot",
                device.attached_node
            ),
            detected_at: now,
        });
    }

    for device in &snapshot.devices {
        if device.status == DeviceStatus::Offline {
            problems.push(Problem {
                key: format!("device:{}:offline", device.hw_address),
                severity: ProblemSeverity::Warning,
                summary: format!("{} is offline", device.hw_address),
                detail: format!("last known attachment was node {}", device.attached_node),
                detected_at: now,
            });
            continue;
        }
        if matches!(device.status, DeviceStatus::Unstable) {
            problems.push(Problem {
                key: format!("device:{}:unstable", device.hw_address),
                severity: ProblemSeverity::Warning,
                summary: format!("{} is flapping", device.hw_address),
                detail: format!("{} disconnects recorded", device.disconnect_count),
                detected_at: now,
            });
        }
        if !matches!(device.link, Link::Wired) {
            if let Some(rssi) = device.last_rssi {
                if rssi < WEAK_SIGNAL_RSSI_DBM {
                    problems.push(Problem {
                        key: format!("device:{}:weak-signal", device.hw_address),
                        severity: ProblemSeverity::Info,
                        summary: format!("{} has a weak signal", device.hw_address),
                        detail: format!("{rssi} dBm on node {}", device.attached_node),
                        detected_at: now,
                    });
                }
            }
        }
    }

    for node in &snapshot.nodes {
        if node.cpu_percent >= HIGH_CPU_PERCENT {
            problems.push(Problem {
                key: format!("node:{}:high-cpu", node.id),
                severity: ProblemSeverity::Warning,
                summary: format!("{} is CPU-saturated", node.id),
                detail: format!("{:.1}% CPU", node.cpu_percent),
                detected_at: now,
            });
        }
        if node.memory_percent >= HIGH_MEMORY_PERCENT {
            problems.push(Problem {
                key: format!("node:{}:high-memory", node.id),
                severity: ProblemSeverity::Warning,
                summary: format!("{} is memory-saturated", node.id),
                detail: format!("{:.1}% memory", node.memory_percent),
                detected_at: now,
            });
        }
    }

    if let Some(err) = snapshot.source_health.errors.get("hub") {
        if !snapshot.source_health.hub_available {
            problems.push(Problem {
                key: "source:hub:unavailable".to_string(),
                severity: ProblemSeverity::Info,
                summary: "home-automation hub unreachable".to_string(),
                detail: err.clone(),
                detected_at: now,
            });
        }
    }
    if let Some(err) = snapshot.source_health.errors.get("snmp") {
        if !snapshot.source_health.snmp_available {
            problems.push(Problem {
                key: "source:snmp:unavailable".to_string(),
                severity: ProblemSeverity::Info,
                summary: "no configured switch responded".to_string(),
                detail: err.clone(),
                detected_at: now,
            });
        }
    }

    if let Some(zigbee) = &snapshot.zigbee {
        for device in &zigbee.devices {
            if !device.available {
                problems.push(Problem {
                    key: format!("zigbee:{}:unavailable", device.ieee_address),
                    severity: ProblemSeverity::Warning,
                    summary: format!("Zigbee device {} is unavailable", device.ieee_address),
                    detail: format!("last LQI {:?}", device.last_lqi),
                    detected_at: now,
                });
            }
        }
    }

    if health.zigbee < ((1.0 - ZIGBEE_OVERLAP_GUARD) * 100.0) as u8 {
        problems.push(Problem {
            key: "spectrum:zigbee-overlap".to_string(),
            severity: ProblemSeverity::Warning,
            summary: "Wi-Fi/Zigbee channel overlap is high".to_string(),
            detail: format!("cross-protocol-harmony subscore {}", health.zigbee),
            detected_at: now,
        });
    }

    if health.stability < LOW_SUBSCORE {
        problems.push(Problem {
            key: "health:stability-low".to_string(),
            severity: ProblemSeverity::Warning,
            summary: "network stability is degraded".to_string(),
            detail: format!("stability subscore {}", health.stability),
            detected_at: now,
        });
    }

    problems.sort_by(|a, b| b.severity.cmp(&a.severity));
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshsentinel_common::{Backhaul, Device, DeviceStatus, Link, Node, SourceHealth};

    fn snapshot_with_device(status: DeviceStatus, attached_node: &str) -> NetworkSnapshot {
        NetworkSnapshot {
            timestamp: Utc::now(),
            nodes: vec![Node {
                id: "n1".to_string(),
                hw_address: "aa:bb:cc:dd:ee:ff".to_string(),
                address: "10.0.0.1".parse().unwrap(),
                is_primary: true,
                backhaul: Backhaul::Wired,
                firmware: "1.0".to_string(),
                uptime_secs: 1000,
                cpu_percent: 10.0,
                memory_percent: 10.0,
                connected_clients: 1,
            }],
            radios: Vec::new(),
            devices: vec![Device {
                hw_address: "11:22:33:44:55:66".to_string(),
                last_ipv4: None,
                hostname: None,
                vendor: None,
                link: Link::Wireless5g,
                attached_node: attached_node.to_string(),
                status,
                last_rssi: Some(-50),
                disconnect_count: 0,
            }],
            neighbor_aps: Vec::new(),
            zigbee: None,
            source_health: SourceHealth::default(),
        }
    }

    #[test]
    fn dangling_attachment_is_critical() {
        let snapshot = snapshot_with_device(DeviceStatus::Online, "ghost-node");
        let health = HealthScore::default();
        let problems = derive_problems(&snapshot, &health);
        assert!(problems
            .iter()
            .any(|p| p.key.ends_with("dangling-attachment") && p.severity == ProblemSeverity::Critical));
    }

    #[test]
    fn offline_device_is_a_warning() {
        let snapshot = snapshot_with_device(DeviceStatus::Offline, "n1");
        let health = HealthScore::default();
        let problems = derive_problems(&snapshot, &health);
        assert!(problems.iter().any(|p| p.key.ends_with("offline")));
    }

    #[test]
    fn healthy_snapshot_yields_no_problems() {
        let snapshot = snapshot_with_device(DeviceStatus::Online, "n1");
        let health = HealthScore {
            overall: 95,
            signal: 95,
            channel: 95,
            zigbee: 100,
            interference: 95,
            stability: 95,
        };
        assert!(derive_problems(&snapshot, &health).is_empty());
    }

    #[test]
    fn problems_sort_most_severe_first() {
        let mut snapshot = snapshot_with_device(DeviceStatus::Offline, "ghost-node");
        snapshot.devices.push(Device {
            hw_address: "77:88:99:aa:bb:cc".to_string(),
            last_ipv4: None,
            hostname: None,
            vendor: None,
            link: Link::Wireless5g,
            attached_node: "n1".to_string(),
            status: DeviceStatus::Online,
            last_rssi: Some(-50),
            disconnect_count: 0,
        });
        let health = HealthScore::default();
        let problems = derive_problems(&snapshot, &health);
        assert_eq!(problems[0].severity, ProblemSeverity::Critical);
    }
}
