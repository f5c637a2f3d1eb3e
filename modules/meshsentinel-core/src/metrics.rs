use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counters and latency samples for one action name.
#[derive(Debug, Default, Clone)]
struct ActionStats {
    count: u64,
    error_count: u64,
    /// Capped ring buffer of recent latencies, newest last. Bounded so a
    /// hot action can't grow this unboundedly over a long-lived process.
    latencies_ms: std::collections::VecDeque<f64>,
}

const MAX_SAMPLES_PER_ACTION: usize = 500;

impl ActionStats {
    fn record(&mut self, elapsed: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.error_count += 1;
        }
        if self.latencies_ms.len() == MAX_SAMPLES_PER_ACTION {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx]
    }
}

/// One action's summarised metrics, as surfaced by the `getMetrics` action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionMetrics {
    pub action_name: String,
    pub count: u64,
    pub error_count: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub actions: Vec<ActionMetrics>,
}

/// What `ActionDispatcher` records into and `getMetrics` reads from
/// (spec §4.10 supplement). Dependency-injected as `Arc<dyn MetricsSink>`
/// rather than a global mutable singleton — see the "no hidden globals"
/// redesign flag.
pub trait MetricsSink: Send + Sync {
    fn record_action(&self, action_name: &str, elapsed: Duration, success: bool);
    fn snapshot(&self) -> MetricsSnapshot;
}

/// In-process `MetricsSink`. No metrics/prometheus crate backs this: the
/// corpus never reaches for one, so a plain `Mutex<HashMap<...>>` plus
/// `tracing` events is the idiomatic match.
#[derive(Default)]
pub struct InMemoryMetrics {
    inner: Mutex<HashMap<String, ActionStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_action(&self, action_name: &str, elapsed: Duration, success: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.entry(action_name.to_string()).or_default().record(elapsed, success);
        tracing::debug!(action = action_name, elapsed_ms = elapsed.as_secs_f64() * 1000.0, success, "action recorded");
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.inner.lock().unwrap();
        let mut actions: Vec<ActionMetrics> = guard
            .iter()
            .map(|(name, stats)| ActionMetrics {
                action_name: name.clone(),
                count: stats.count,
                error_count: stats.error_count,
                p50_ms: stats.percentile(0.5),
                p95_ms: stats.percentile(0.95),
                max_ms: stats.latencies_ms.iter().copied().fold(0.0, f64::max),
            })
            .collect();
        actions.sort_by(|a, b| a.action_name.cmp(&b.action_name));
        MetricsSnapshot { actions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_count_and_errors_per_action() {
        let sink = InMemoryMetrics::new();
        sink.record_action("scanNetwork", Duration::from_millis(10), true);
        sink.record_action("scanNetwork", Duration::from_millis(20), false);
        sink.record_action("getMetrics", Duration::from_millis(1), true);

        let snap = sink.snapshot();
        let scan = snap.actions.iter().find(|a| a.action_name == "scanNetwork").unwrap();
        assert_eq!(scan.count, 2);
        assert_eq!(scan.error_count, 1);
        assert!(scan.max_ms >= 20.0);
    }

    #[test]
    fn caps_samples_per_action() {
        let sink = InMemoryMetrics::new();
        for _ in 0..(MAX_SAMPLES_PER_ACTION + 50) {
            sink.record_action("spam", Duration::from_millis(5), true);
        }
        let snap = sink.snapshot();
        let spam = snap.actions.iter().find(|a| a.action_name == "spam").unwrap();
        assert_eq!(spam.count, (MAX_SAMPLES_PER_ACTION + 50) as u64);
    }
}
