use meshsentinel_common::{NodePosition, SignalSample};
use serde::Serialize;

const ATTENUATION_THRESHOLD_DB: f64 = 5.0;
const CLUSTER_TOLERANCE_M: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WallMaterial {
    Glass,
    Drywall,
    Brick,
    Concrete,
    Unknown,
}

impl WallMaterial {
    fn from_delta_db(delta: f64) -> Self {
        if delta <= 5.0 {
            WallMaterial::Glass
        } else if delta <= 10.0 {
            WallMaterial::Drywall
        } else if delta <= 18.0 {
            WallMaterial::Brick
        } else if delta <= 30.0 {
            WallMaterial::Concrete
        } else {
            WallMaterial::Unknown
        }
    }
}

#[derive(Debug, Clone)]
pub struct WallSegment {
    pub midpoint_x: f64,
    pub midpoint_y: f64,
    pub material: WallMaterial,
    pub sample_count: u32,
    pub confidence: f32,
}

struct AttenuationDelta {
    midpoint_x: f64,
    midpoint_y: f64,
    delta_db: f64,
}

/// Infer wall segments from path-loss residuals (spec §4.6). For every
/// sample whose RSSI fell further than the threshold below what the
/// straight-line path-loss model predicted, the shortfall is treated as
/// evidence of an obstruction at that line's midpoint; midpoints within
/// `CLUSTER_TOLERANCE_M` of each other are merged into one wall guess.
pub fn infer_walls(
    samples: &[SignalSample],
    node_of: impl Fn(&str) -> Option<NodePosition>,
    path_loss_exponent: f64,
    reference_rssi_dbm: f64,
    device_xy: (f64, f64),
) -> Vec<WallSegment> {
    let mut deltas = Vec::new();

    for sample in samples {
        let Some(node) = node_of(&sample.node_addr) else {
            continue;
        };
        let distance = ((device_xy.0 - node.x).powi(2) + (device_xy.1 - node.y).powi(2)).sqrt();
        if distance < 0.1 {
            continue;
        }
        let expected_rssi = reference_rssi_dbm - 10.0 * path_loss_exponent * distance.log10();
        let actual = sample.rssi as f64;
        let shortfall = expected_rssi - actual;
        if shortfall >= ATTENUATION_THRESHOLD_DB {
            deltas.push(AttenuationDelta {
                midpoint_x: (device_xy.0 + node.x) / 2.0,
                midpoint_y: (device_xy.1 + node.y) / 2.0,
                delta_db: shortfall,
            });
        }
    }

    cluster(deltas)
}

fn cluster(deltas: Vec<AttenuationDelta>) -> Vec<WallSegment> {
    let mut clusters: Vec<Vec<AttenuationDelta>> = Vec::new();

    'outer: for delta in deltas {
        for cluster in clusters.iter_mut() {
            let anchor = &cluster[0];
            let dist = ((delta.midpoint_x - anchor.midpoint_x).powi(2)
                + (delta.midpoint_y - anchor.midpoint_y).powi(2))
            .sqrt();
            if dist <= CLUSTER_TOLERANCE_M {
                cluster.push(delta);
                continue 'outer;
            }
        }
        clusters.push(vec![delta]);
    }

    clusters
        .into_iter()
        .map(|cluster| {
            let count = cluster.len() as u32;
            let mean_x = cluster.iter().map(|d| d.midpoint_x).sum::<f64>() / count as f64;
            let mean_y = cluster.iter().map(|d| d.midpoint_y).sum::<f64>() / count as f64;
            let mean_delta = cluster.iter().map(|d| d.delta_db).sum::<f64>() / count as f64;
            WallSegment {
                midpoint_x: mean_x,
                midpoint_y: mean_y,
                material: WallMaterial::from_delta_db(mean_delta),
                sample_count: count,
                confidence: (count as f32 / 10.0).min(1.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn node(x: f64, y: f64) -> NodePosition {
        NodePosition {
            node_id: "n1".to_string(),
            floor: 0,
            x,
            y,
            z: 0.0,
            coverage_radius_m: HashMap::new(),
            outdoor: false,
        }
    }

    fn sample(rssi: i32) -> SignalSample {
        SignalSample {
            timestamp: Utc::now(),
            device_addr: "dev1".to_string(),
            node_addr: "n1".to_string(),
            rssi,
            channel: None,
            width_mhz: None,
            rate_mbps: None,
        }
    }

    #[test]
    fn strong_attenuation_produces_a_wall_segment() {
        let samples = vec![sample(-80)];
        let walls = infer_walls(&samples, |_| Some(node(0.0, 0.0)), 3.5, -40.0, (10.0, 0.0));
        assert_eq!(walls.len(), 1);
        assert_eq!(walls[0].sample_count, 1);
    }

    #[test]
    fn nearby_deltas_merge_into_one_cluster() {
        let samples = vec![sample(-85), sample(-83)];
        let walls = infer_walls(&samples, |_| Some(node(0.0, 0.0)), 3.5, -40.0, (10.0, 0.0));
        assert_eq!(walls.len(), 1);
        assert_eq!(walls[0].sample_count, 2);
    }

    #[test]
    fn classifies_material_by_delta_magnitude() {
        assert_eq!(WallMaterial::from_delta_db(3.0), WallMaterial::Glass);
        assert_eq!(WallMaterial::from_delta_db(8.0), WallMaterial::Drywall);
        assert_eq!(WallMaterial::from_delta_db(15.0), WallMaterial::Brick);
        assert_eq!(WallMaterial::from_delta_db(25.0), WallMaterial::Concrete);
        assert_eq!(WallMaterial::from_delta_db(40.0), WallMaterial::Unknown);
    }
}
