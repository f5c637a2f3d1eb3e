pub mod positions;
pub mod spectrum;
pub mod store;
pub mod triangulator;
pub mod walls;

pub use positions::NodePositionStore;
pub use spectrum::{overlap_with_zigbee, ChannelRecommendation, ChannelScan, SpectrumAnalyser};
pub use store::SignalStore;
pub use triangulator::Triangulator;
pub use walls::{infer_walls, WallMaterial, WallSegment};

/// Improvement threshold below which a channel-change suggestion isn't
/// worth the disruption of a radio restart (spec §4.7).
pub const CHANNEL_IMPROVEMENT_THRESHOLD_24GHZ: f64 = 20.0;
pub const CHANNEL_IMPROVEMENT_THRESHOLD_5GHZ: f64 = 15.0;
