use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use meshsentinel_common::SignalSample;

const DEFAULT_PER_KEY_CAP: usize = 1000;
const RECENT_WINDOW: Duration = Duration::hours(1);

/// Append-only per-(device, node) RSSI history (spec §4.5). Single
/// logical writer (the `SnapshotBuilder`'s measurement fan-in), many
/// concurrent readers — guarded by an `RwLock` rather than a channel
/// since reads vastly outnumber writes.
pub struct SignalStore {
    samples: RwLock<HashMap<(String, String), Vec<SignalSample>>>,
    per_key_cap: usize,
    retention: Duration,
}

impl SignalStore {
    pub fn new(retention_days: u32) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            per_key_cap: DEFAULT_PER_KEY_CAP,
            retention: Duration::days(retention_days as i64),
        }
    }

    /// Append one sample. Samples within a key are kept strictly ordered
    /// by timestamp; the oldest is discarded once the per-key cap is
    /// exceeded.
    pub fn append(&self, sample: SignalSample) {
        let key = (sample.device_addr.clone(), sample.node_addr.clone());
        let mut guard = self.samples.write().unwrap();
        let entry = guard.entry(key).or_default();
        entry.push(sample);
        if entry.len() > self.per_key_cap {
            let overflow = entry.len() - self.per_key_cap;
            entry.drain(0..overflow);
        }
    }

    /// Drop samples older than the retention window and delete keys left
    /// empty by the sweep. Intended to run on an hourly timer.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        let mut guard = self.samples.write().unwrap();
        guard.retain(|_, samples| {
            samples.retain(|s| s.timestamp >= cutoff);
            !samples.is_empty()
        });
    }

    /// Samples from the last hour for `device_addr`, across all nodes,
    /// newest last, capped at `limit`.
    pub fn recent(&self, device_addr: &str, limit: usize) -> Vec<SignalSample> {
        let now = Utc::now();
        let cutoff = now - RECENT_WINDOW;
        let guard = self.samples.read().unwrap();
        let mut matched: Vec<SignalSample> = guard
            .iter()
            .filter(|((dev, _), _)| dev == device_addr)
            .flat_map(|(_, samples)| samples.iter().cloned())
            .filter(|s| s.timestamp >= cutoff)
            .collect();
        matched.sort_by_key(|s| s.timestamp);
        if matched.len() > limit {
            let drop = matched.len() - limit;
            matched.drain(0..drop);
        }
        matched
    }

    /// Samples for `device_addr` since an arbitrary cutoff, across all
    /// nodes, newest last, capped at `limit`. Generalises `recent`'s
    /// fixed one-hour window for callers that take an explicit lookback
    /// (the `deviceSignalHistory` action's `hours` parameter).
    pub fn history_since(&self, device_addr: &str, since: DateTime<Utc>, limit: usize) -> Vec<SignalSample> {
        let guard = self.samples.read().unwrap();
        let mut matched: Vec<SignalSample> = guard
            .iter()
            .filter(|((dev, _), _)| dev == device_addr)
            .flat_map(|(_, samples)| samples.iter().cloned())
            .filter(|s| s.timestamp >= since)
            .collect();
        matched.sort_by_key(|s| s.timestamp);
        if matched.len() > limit {
            let drop = matched.len() - limit;
            matched.drain(0..drop);
        }
        matched
    }

    /// The freshest sample per node for `device_addr` — input to the
    /// `Triangulator`.
    pub fn last_per_node(&self, device_addr: &str) -> HashMap<String, SignalSample> {
        let guard = self.samples.read().unwrap();
        guard
            .iter()
            .filter(|((dev, _), _)| dev == device_addr)
            .filter_map(|((_, node), samples)| samples.last().map(|s| (node.clone(), s.clone())))
            .collect()
    }

    pub fn key_count(&self) -> usize {
        self.samples.read().unwrap().len()
    }
}
