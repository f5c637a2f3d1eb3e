//! Orchestration layer: wires `meshsentinel-deviceshell`, `-hub`, `-snmp`,
//! `-signal` and `-engine` together into one scan pipeline, and turns a
//! finished scan into environment health and metrics.

mod builder;
mod health;
mod metrics;
mod parsing;
mod problems;

pub use builder::{ScanOutcome, ScanPhase, ScanProgress, SnapshotBuilder};
pub use health::compute_health_score;
pub use metrics::{ActionMetrics, InMemoryMetrics, MetricsSink, MetricsSnapshot};
pub use parsing::parse_zigbee_network;
pub use problems::derive_problems;
