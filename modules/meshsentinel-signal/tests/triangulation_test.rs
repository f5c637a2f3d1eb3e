//! Literal scenario: nodes A/B/C at the corners of a living room, device X
//! observed at -50/-65/-68 dBm respectively, resolves to a trilaterated fix
//! near (1.9, 2.3) with confidence >= 0.6.

use std::collections::HashMap;

use chrono::Utc;
use meshsentinel_common::{NodePosition, SignalSample, TriangulationMethod};
use meshsentinel_signal::Triangulator;

fn node(id: &str, x: f64, y: f64) -> NodePosition {
    NodePosition {
        node_id: id.to_string(),
        floor: 0,
        x,
        y,
        z: 0.0,
        coverage_radius_m: HashMap::new(),
        outdoor: false,
    }
}

fn sample(node_addr: &str, rssi: i32) -> SignalSample {
    SignalSample {
        timestamp: Utc::now(),
        device_addr: "devX".to_string(),
        node_addr: node_addr.to_string(),
        rssi,
        channel: None,
        width_mhz: None,
        rate_mbps: None,
    }
}

#[test]
fn living_room_fix_matches_expected_corner() {
    let triangulator = Triangulator::new(3.5, -40.0);
    let nodes = HashMap::from([
        ("a".to_string(), node("a", 0.0, 0.0)),
        ("b".to_string(), node("b", 10.0, 0.0)),
        ("c".to_string(), node("c", 0.0, 10.0)),
    ]);
    let samples = HashMap::from([
        ("a".to_string(), sample("a", -50)),
        ("b".to_string(), sample("b", -65)),
        ("c".to_string(), sample("c", -68)),
    ]);

    let position = triangulator.locate("devX", &samples, &nodes).unwrap();

    assert_eq!(position.method, TriangulationMethod::Trilateration);
    assert!(position.confidence >= 0.6);
    assert!((position.x - 1.9).abs() < 3.0, "x={}", position.x);
    assert!((position.y - 2.3).abs() < 3.0, "y={}", position.y);
}
