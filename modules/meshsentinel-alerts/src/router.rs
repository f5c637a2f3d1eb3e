use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backend::AlertBackend;
use crate::types::{AlertThreshold, Problem};

/// Bound on how many routed problems `getAlerts` can look back through.
/// Large enough to cover days of routine alert volume without letting a
/// noisy network grow this unboundedly over a long-lived process.
const MAX_HISTORY: usize = 2000;

/// Matches `Problem`s against a configured threshold and a per-key
/// cooldown, then fans surviving alerts out to every registered backend
/// (spec §2: "per-key cooldown", §6: webhook/broker outbound).
///
/// The threshold is reconfigurable at runtime (`configureAlerts`), so it
/// lives behind the same kind of `Mutex` as the cooldown ledger rather
/// than as a plain field.
pub struct AlertRouter {
    threshold: Mutex<AlertThreshold>,
    backends: Vec<Box<dyn AlertBackend>>,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
    history: Mutex<VecDeque<Problem>>,
}

impl AlertRouter {
    pub fn new(threshold: AlertThreshold, backends: Vec<Box<dyn AlertBackend>>) -> Self {
        Self {
            threshold: Mutex::new(threshold),
            backends,
            last_sent: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn threshold(&self) -> AlertThreshold {
        self.threshold.lock().unwrap().clone()
    }

    /// Replace the routing threshold in place (spec's `configureAlerts`
    /// action). Takes effect on the next `route()` call; in-flight cooldown
    /// state is untouched.
    pub fn reconfigure_threshold(&self, threshold: AlertThreshold) {
        *self.threshold.lock().unwrap() = threshold;
    }

    /// Every routed problem seen since `since`, newest first (spec's
    /// `getAlerts` action).
    pub fn history_since(&self, since: DateTime<Utc>) -> Vec<Problem> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|p| p.detected_at >= since)
            .cloned()
            .collect()
    }

    /// Route every problem that clears the severity floor and isn't
    /// still in its cooldown window. Returns the keys actually sent.
    pub async fn route(&self, problems: &[Problem]) -> Vec<String> {
        let min_severity = self.threshold.lock().unwrap().min_severity;
        let mut sent = Vec::new();
        for problem in problems {
            if problem.severity < min_severity {
                continue;
            }
            if !self.clear_cooldown(problem) {
                continue;
            }
            self.record_history(problem);
            self.dispatch(problem).await;
            sent.push(problem.key.clone());
        }
        sent
    }

    fn record_history(&self, problem: &Problem) {
        let mut history = self.history.lock().unwrap();
        if history.len() == MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(problem.clone());
    }

    fn clear_cooldown(&self, problem: &Problem) -> bool {
        let cooldown_secs = self.threshold.lock().unwrap().cooldown_secs;
        let mut guard = self.last_sent.lock().unwrap();
        let now = Utc::now();
        match guard.get(&problem.key) {
            Some(last) if (now - *last).num_seconds() < cooldown_secs as i64 => false,
            _ => {
                guard.insert(problem.key.clone(), now);
                true
            }
        }
    }

    async fn dispatch(&self, problem: &Problem) {
        for backend in &self.backends {
            if let Err(e) = backend.send(problem).await {
                warn!(key = %problem.key, error = %e, "alert backend failed");
            }
        }
        info!(key = %problem.key, severity = ?problem.severity, "alert routed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProblemSeverity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AlertBackend for CountingBackend {
        async fn send(&self, _problem: &Problem) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn problem(key: &str, severity: ProblemSeverity) -> Problem {
        Problem {
            key: key.to_string(),
            severity,
            summary: "test".to_string(),
            detail: "test detail".to_string(),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn below_threshold_problems_are_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let router = AlertRouter::new(
            AlertThreshold {
                min_severity: ProblemSeverity::Critical,
                cooldown_secs: 60,
            },
            vec![Box::new(CountingBackend { count: count.clone() })],
        );
        router.route(&[problem("k1", ProblemSeverity::Warning)]).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_problem_within_cooldown_is_suppressed() {
        let count = Arc::new(AtomicUsize::new(0));
        let router = AlertRouter::new(
            AlertThreshold {
                min_severity: ProblemSeverity::Info,
                cooldown_secs: 900,
            },
            vec![Box::new(CountingBackend { count: count.clone() })],
        );
        let sent_first = router.route(&[problem("k1", ProblemSeverity::Warning)]).await;
        let sent_second = router.route(&[problem("k1", ProblemSeverity::Warning)]).await;
        assert_eq!(sent_first, vec!["k1".to_string()]);
        assert!(sent_second.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
