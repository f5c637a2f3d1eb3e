use crate::types::Band;

/// Single source of truth for "which channels are legal on this band",
/// replacing the per-band implicit-literal tables the design notes (spec
/// §9) call out as a source anti-pattern.
pub struct ChannelPlan;

impl ChannelPlan {
    /// The full valid-channel set for a band, regulatory-domain-agnostic
    /// (the union of channels seen across common domains — a snapshot
    /// reporting a channel outside this set is a data-quality problem,
    /// not a feature MeshSentinel reconciles against a specific country).
    pub fn valid_channels(band: Band) -> &'static [u16] {
        match band {
            Band::Band24 => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13],
            Band::Band5 | Band::Band5Alt => &[
                36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136,
                140, 144, 149, 153, 157, 161, 165,
            ],
            Band::Band6 => &[
                1, 5, 9, 13, 17, 21, 25, 29, 33, 37, 41, 45, 49, 53, 57, 61, 65, 69, 73, 77, 81,
                85, 89, 93, 97, 101, 105, 109, 113, 117, 121, 125, 129, 133, 137, 141, 145, 149,
                153, 157, 161, 165, 169, 173, 177, 181, 185, 189, 193, 197, 201, 205, 209, 213,
                217, 221, 225, 229, 233,
            ],
        }
    }

    pub fn is_valid(band: Band, channel: u16) -> bool {
        Self::valid_channels(band).contains(&channel)
    }

    /// 2.4 GHz channels considered "non-overlapping" — used by the
    /// spectrum analyser's +5 bonus rule.
    pub const NON_OVERLAPPING_24: [u16; 3] = [1, 6, 11];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_6_valid_on_24ghz() {
        assert!(ChannelPlan::is_valid(Band::Band24, 6));
        assert!(!ChannelPlan::is_valid(Band::Band24, 14));
    }

    #[test]
    fn channel_36_valid_on_5ghz() {
        assert!(ChannelPlan::is_valid(Band::Band5, 36));
        assert!(!ChannelPlan::is_valid(Band::Band5, 37));
    }
}
