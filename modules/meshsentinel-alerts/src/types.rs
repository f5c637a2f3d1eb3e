use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSeverity {
    Info,
    Warning,
    Critical,
}

/// A condition worth surfacing, derived from a `NetworkSnapshot` or
/// `HealthScore` by the caller (typically `SnapshotBuilder`). Kept
/// independent of those types so this crate doesn't need to know how a
/// problem was detected, only how to route it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Stable identity used for cooldown keying, e.g.
    /// `"device:aa:bb:cc:dd:ee:ff:offline"` or `"radio:node1:2.4:overlap"`.
    pub key: String,
    pub severity: ProblemSeverity,
    pub summary: String,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub min_severity: ProblemSeverity,
    pub cooldown_secs: u64,
}

impl Default for AlertThreshold {
    fn default() -> Self {
        Self {
            min_severity: ProblemSeverity::Warning,
            cooldown_secs: 900,
        }
    }
}
