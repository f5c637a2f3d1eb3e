use std::collections::HashMap;

use meshsentinel_common::{DevicePosition, MeshError, MeshResult, NodePosition, SignalSample, TriangulationMethod};
use nalgebra::{Matrix3, Vector3};

const MIN_DISTANCE_M: f64 = 0.5;
const MIN_RSSI_DBM: i32 = -100;
const MAX_RSSI_DBM: i32 = -20;

/// One (node position, observed RSSI) input reading, already joined on
/// `hw_address`/`node_addr`.
struct Reading<'a> {
    node: &'a NodePosition,
    distance_m: f64,
}

/// Converts RSSI samples and known node placements into device positions
/// (spec §4.6). Tunables come from `Config.triangulation` — see the
/// path-loss-exponent/reference-RSSI open question resolved there.
pub struct Triangulator {
    path_loss_exponent: f64,
    reference_rssi_dbm: f64,
}

impl Triangulator {
    pub fn new(path_loss_exponent: f64, reference_rssi_dbm: f64) -> Self {
        Self {
            path_loss_exponent,
            reference_rssi_dbm,
        }
    }

    fn rssi_to_distance(&self, rssi: i32) -> f64 {
        let clamped = rssi.clamp(MIN_RSSI_DBM, MAX_RSSI_DBM) as f64;
        let distance = 10f64.powf((self.reference_rssi_dbm - clamped) / (10.0 * self.path_loss_exponent));
        distance.max(MIN_DISTANCE_M)
    }

    /// Solve a device's position from its freshest per-node samples.
    /// `nodes` must contain every `NodePosition` referenced by `samples`.
    pub fn locate(
        &self,
        device_addr: &str,
        samples: &HashMap<String, SignalSample>,
        nodes: &HashMap<String, NodePosition>,
    ) -> MeshResult<DevicePosition> {
        let readings: Vec<Reading> = samples
            .iter()
            .filter_map(|(node_addr, sample)| {
                nodes.get(node_addr).map(|node| Reading {
                    node,
                    distance_m: self.rssi_to_distance(sample.rssi),
                })
            })
            .collect();

        if readings.is_empty() {
            return Err(MeshError::InsufficientData(format!(
                "no known-position node samples for {device_addr}"
            )));
        }

        if all_identical(&readings) {
            return Err(MeshError::InsufficientData(format!(
                "all readings identical for {device_addr}, cannot resolve a position"
            )));
        }

        let bounds = HouseBounds::from_nodes(nodes.values());

        match readings.len() {
            1 => Ok(single_node_fallback(device_addr, &readings[0])),
            2 => Ok(bilaterate(device_addr, &readings[0], &readings[1], &bounds)),
            _ if non_collinear(&readings) => trilaterate(device_addr, &readings, &bounds),
            _ => {
                // Collinear with 3+ readings: fall back to the strongest
                // two-node bilateration rather than an ill-conditioned solve.
                let mut sorted = readings;
                sorted.sort_by(|a, b| a.distance_m.partial_cmp(&b.distance_m).unwrap());
                Ok(bilaterate(device_addr, &sorted[0], &sorted[1], &bounds))
            }
        }
    }
}

fn all_identical(readings: &[Reading]) -> bool {
    readings.len() > 1
        && readings
            .windows(2)
            .all(|w| (w[0].distance_m - w[1].distance_m).abs() < f64::EPSILON)
}

fn non_collinear(readings: &[Reading]) -> bool {
    if readings.len() < 3 {
        return false;
    }
    let (x1, y1) = (readings[0].node.x, readings[0].node.y);
    let (x2, y2) = (readings[1].node.x, readings[1].node.y);
    readings[2..].iter().any(|r| {
        let area = (x2 - x1) * (r.node.y - y1) - (r.node.x - x1) * (y2 - y1);
        area.abs() > 1e-6
    })
}

fn single_node_fallback(device_addr: &str, reading: &Reading) -> DevicePosition {
    // Deterministic but otherwise arbitrary direction: offset along +x.
    DevicePosition {
        device_addr: device_addr.to_string(),
        x: reading.node.x + reading.distance_m,
        y: reading.node.y,
        z: reading.node.z,
        floor: reading.node.floor,
        confidence: 0.25,
        method: TriangulationMethod::Single,
        contributing_readings: 1,
    }
}

fn bilaterate(device_addr: &str, a: &Reading, b: &Reading, bounds: &HouseBounds) -> DevicePosition {
    let (x1, y1, r1) = (a.node.x, a.node.y, a.distance_m);
    let (x2, y2, r2) = (b.node.x, b.node.y, b.distance_m);
    let d = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt().max(1e-6);

    // Two circles with centres further apart than the sum of radii, or
    // one containing the other, don't intersect; clamp to the point on
    // the line between centres proportional to the relative distances.
    if d > r1 + r2 || d < (r1 - r2).abs() {
        let t = r1 / (r1 + r2).max(1e-6);
        let mx = x1 + t * (x2 - x1);
        let my = y1 + t * (y2 - y1);
        return DevicePosition {
            device_addr: device_addr.to_string(),
            x: mx,
            y: my,
            z: (a.node.z + b.node.z) / 2.0,
            floor: a.node.floor,
            confidence: 0.4,
            method: TriangulationMethod::Bilateration,
            contributing_readings: 2,
        };
    }

    let a_term = (r1.powi(2) - r2.powi(2) + d.powi(2)) / (2.0 * d);
    let h = (r1.powi(2) - a_term.powi(2)).max(0.0).sqrt();
    let px = x1 + a_term * (x2 - x1) / d;
    let py = y1 + a_term * (y2 - y1) / d;
    let ox = -(y2 - y1) / d;
    let oy = (x2 - x1) / d;

    let candidate1 = (px + h * ox, py + h * oy);
    let candidate2 = (px - h * ox, py - h * oy);
    let chosen = bounds.prefer(candidate1, candidate2);

    DevicePosition {
        device_addr: device_addr.to_string(),
        x: chosen.0,
        y: chosen.1,
        z: (a.node.z + b.node.z) / 2.0,
        floor: a.node.floor,
        confidence: 0.5,
        method: TriangulationMethod::Bilateration,
        contributing_readings: 2,
    }
}

fn trilaterate(device_addr: &str, readings: &[Reading], bounds: &HouseBounds) -> MeshResult<DevicePosition> {
    let first = &readings[0];
    let (x1, y1, z1, d1) = (first.node.x, first.node.y, first.node.z, first.distance_m);

    let mut a = Vec::new();
    let mut b = Vec::new();
    for r in &readings[1..] {
        let (xi, yi, zi, di) = (r.node.x, r.node.y, r.node.z, r.distance_m);
        a.push([2.0 * (x1 - xi), 2.0 * (y1 - yi), 2.0 * (z1 - zi)]);
        b.push(
            di.powi(2) - d1.powi(2) - (xi.powi(2) + yi.powi(2) + zi.powi(2))
                + (x1.powi(2) + y1.powi(2) + z1.powi(2)),
        );
    }

    // Normal equations: (A^T A) x = A^T b. Nodes placed on a single floor
    // (the common case) leave the z column identically zero, which makes
    // a literal 3x3 inverse undefined even though x/y are perfectly
    // determined — a pseudo-inverse resolves the rank-deficient z
    // direction to its minimum-norm value instead of failing outright.
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for (row, rhs) in a.iter().zip(b.iter()) {
        let row_vec = Vector3::new(row[0], row[1], row[2]);
        ata += row_vec * row_vec.transpose();
        atb += row_vec * *rhs;
    }

    let solution = ata
        .pseudo_inverse(1e-9)
        .map(|pinv| pinv * atb)
        .map_err(|_| MeshError::InsufficientData(format!("degenerate geometry for {device_addr}")))?;

    let residual: f64 = readings
        .iter()
        .map(|r| {
            let dx = solution.x - r.node.x;
            let dy = solution.y - r.node.y;
            let dz = solution.z - r.node.z;
            ((dx * dx + dy * dy + dz * dz).sqrt() - r.distance_m).abs()
        })
        .sum::<f64>()
        / readings.len() as f64;

    let confidence = (1.0 - (residual / 10.0)).clamp(0.6, 1.0) as f32;
    let floor = bounds.nearest_floor(solution.z);

    Ok(DevicePosition {
        device_addr: device_addr.to_string(),
        x: solution.x,
        y: solution.y,
        z: solution.z,
        floor,
        confidence,
        method: TriangulationMethod::Trilateration,
        contributing_readings: readings.len() as u32,
    })
}

/// Axis-aligned bounding box over all known `NodePosition`s, used only to
/// disambiguate the two-solution case in bilateration/trilateration. The
/// spec names "the house bounding box" without defining its source; this
/// derives it from the operator-entered node placements rather than
/// inventing a separate config surface.
struct HouseBounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
    floors: Vec<(i32, f64)>,
}

impl HouseBounds {
    fn from_nodes<'a>(nodes: impl Iterator<Item = &'a NodePosition>) -> Self {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut floors = Vec::new();
        for n in nodes {
            min_x = min_x.min(n.x);
            max_x = max_x.max(n.x);
            min_y = min_y.min(n.y);
            max_y = max_y.max(n.y);
            floors.push((n.floor, n.z));
        }
        if !min_x.is_finite() {
            min_x = 0.0;
            max_x = 0.0;
            min_y = 0.0;
            max_y = 0.0;
        }
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            floors,
        }
    }

    fn contains(&self, point: (f64, f64)) -> bool {
        point.0 >= self.min_x && point.0 <= self.max_x && point.1 >= self.min_y && point.1 <= self.max_y
    }

    /// Prefer the candidate inside the bounding box; if both are inside
    /// (or both outside), prefer the one closer to the bounding box
    /// centre as a proxy for "smaller mean residual" when no residual
    /// history is available at this call site.
    fn prefer(&self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match (self.contains(a), self.contains(b)) {
            (true, false) => a,
            (false, true) => b,
            _ => {
                let centre = ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0);
                let dist = |p: (f64, f64)| (p.0 - centre.0).powi(2) + (p.1 - centre.1).powi(2);
                if dist(a) <= dist(b) {
                    a
                } else {
                    b
                }
            }
        }
    }

    fn nearest_floor(&self, z: f64) -> i32 {
        self.floors
            .iter()
            .min_by(|a, b| (a.1 - z).abs().partial_cmp(&(b.1 - z).abs()).unwrap())
            .map(|(floor, _)| *floor)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(id: &str, x: f64, y: f64, floor: i32) -> NodePosition {
        NodePosition {
            node_id: id.to_string(),
            floor,
            x,
            y,
            z: floor as f64 * 3.0,
            coverage_radius_m: HashMap::new(),
            outdoor: false,
        }
    }

    fn sample(node_addr: &str, rssi: i32) -> SignalSample {
        SignalSample {
            timestamp: Utc::now(),
            device_addr: "dev1".to_string(),
            node_addr: node_addr.to_string(),
            rssi,
            channel: None,
            width_mhz: None,
            rate_mbps: None,
        }
    }

    #[test]
    fn single_reading_offsets_from_node() {
        let t = Triangulator::new(3.5, -40.0);
        let nodes = HashMap::from([("n1".to_string(), node("n1", 0.0, 0.0, 0))]);
        let samples = HashMap::from([("n1".to_string(), sample("n1", -60))]);
        let pos = t.locate("dev1", &samples, &nodes).unwrap();
        assert_eq!(pos.method, TriangulationMethod::Single);
        assert!(pos.confidence <= 0.25);
    }

    #[test]
    fn two_readings_bilaterate_with_bounded_confidence() {
        let t = Triangulator::new(3.5, -40.0);
        let nodes = HashMap::from([
            ("n1".to_string(), node("n1", 0.0, 0.0, 0)),
            ("n2".to_string(), node("n2", 10.0, 0.0, 0)),
        ]);
        let samples = HashMap::from([
            ("n1".to_string(), sample("n1", -55)),
            ("n2".to_string(), sample("n2", -65)),
        ]);
        let pos = t.locate("dev1", &samples, &nodes).unwrap();
        assert_eq!(pos.method, TriangulationMethod::Bilateration);
        assert!(pos.confidence <= 0.5);
    }

    #[test]
    fn three_non_collinear_readings_trilaterate() {
        let t = Triangulator::new(3.5, -40.0);
        let nodes = HashMap::from([
            ("n1".to_string(), node("n1", 0.0, 0.0, 0)),
            ("n2".to_string(), node("n2", 10.0, 0.0, 0)),
            ("n3".to_string(), node("n3", 0.0, 10.0, 0)),
        ]);
        let samples = HashMap::from([
            ("n1".to_string(), sample("n1", -55)),
            ("n2".to_string(), sample("n2", -60)),
            ("n3".to_string(), sample("n3", -62)),
        ]);
        let pos = t.locate("dev1", &samples, &nodes).unwrap();
        assert_eq!(pos.method, TriangulationMethod::Trilateration);
        assert!(pos.confidence >= 0.6);
    }

    #[test]
    fn living_room_three_node_fix_lands_near_expected_corner() {
        let t = Triangulator::new(3.5, -40.0);
        let nodes = HashMap::from([
            ("a".to_string(), node("a", 0.0, 0.0, 0)),
            ("b".to_string(), node("b", 10.0, 0.0, 0)),
            ("c".to_string(), node("c", 0.0, 10.0, 0)),
        ]);
        let samples = HashMap::from([
            ("a".to_string(), sample("a", -50)),
            ("b".to_string(), sample("b", -65)),
            ("c".to_string(), sample("c", -68)),
        ]);
        let pos = t.locate("dev1", &samples, &nodes).unwrap();
        assert_eq!(pos.method, TriangulationMethod::Trilateration);
        assert!(pos.confidence >= 0.6);
        assert!((pos.x - 1.9).abs() < 3.0, "x={}", pos.x);
        assert!((pos.y - 2.3).abs() < 3.0, "y={}", pos.y);
    }

    #[test]
    fn identical_readings_yield_insufficient_data() {
        let t = Triangulator::new(3.5, -40.0);
        let nodes = HashMap::from([
            ("n1".to_string(), node("n1", 0.0, 0.0, 0)),
            ("n2".to_string(), node("n2", 10.0, 0.0, 0)),
        ]);
        let samples = HashMap::from([
            ("n1".to_string(), sample("n1", -60)),
            ("n2".to_string(), sample("n2", -60)),
        ]);
        let err = t.locate("dev1", &samples, &nodes).unwrap_err();
        assert!(matches!(err, MeshError::InsufficientData(_)));
    }

    #[test]
    fn distance_clamped_to_minimum() {
        let t = Triangulator::new(3.5, -40.0);
        assert!(t.rssi_to_distance(-10) >= MIN_DISTANCE_M);
    }
}
