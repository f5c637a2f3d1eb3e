use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use meshsentinel_common::{MeshError, MeshResult, Suggestion};
use tracing::info;

use crate::apply::{apply_action, RadioController};
use crate::candidate::Candidate;
use crate::rules::{run_all, RuleInputs};
use crate::targets::OptimisationTarget;

/// The outcome of `apply` when the caller didn't set `confirm`: an echo
/// of what would happen, without mutating anything.
pub struct PendingConfirmation {
    pub token: String,
    pub category: meshsentinel_common::SuggestionCategory,
    pub current_value: String,
    pub target_value: String,
    pub risk: meshsentinel_common::Risk,
}

pub enum ApplyOutcome {
    Pending(PendingConfirmation),
    Applied { rescan_hint: bool },
}

/// Turns a snapshot plus spectrum/Zigbee context into ranked,
/// token-bound `Suggestion`s, and later resolves those tokens against
/// confirmed applies (spec §4.9). Suggestions are snapshot-scoped: a
/// fresh `generate` call discards every previously issued token.
pub struct RecommendationEngine {
    pending: Mutex<HashMap<String, Suggestion>>,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationEngine {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Run every applicable rule pack, dedup by `(actionType, parameters)`,
    /// sort by `(priority desc, confidence desc)`, and issue a token per
    /// survivor. Replaces the full pending-token set.
    pub fn generate(&self, inputs: &RuleInputs, targets: &[OptimisationTarget]) -> Vec<Suggestion> {
        let candidates = run_all(inputs, targets);
        let deduped = dedup(candidates);
        let mut sorted = deduped;
        sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.confidence.partial_cmp(&a.confidence).unwrap())
        });

        let snapshot_timestamp = inputs.snapshot.timestamp;
        let suggestions: Vec<Suggestion> = sorted
            .into_iter()
            .map(|c| Suggestion {
                token: uuid::Uuid::new_v4().to_string(),
                priority: c.priority,
                category: c.category,
                current_value: c.current_value,
                target_value: c.target_value,
                risk: c.risk,
                expected_improvement: c.expected_improvement,
                affected_devices: c.affected_devices,
                snapshot_timestamp,
                action: c.action,
            })
            .collect();

        let mut guard = self.pending.lock().unwrap();
        guard.clear();
        for s in &suggestions {
            guard.insert(s.token.clone(), s.clone());
        }
        info!(count = suggestions.len(), "recommendations generated");
        suggestions
    }

    pub fn suggestion(&self, token: &str) -> Option<Suggestion> {
        self.pending.lock().unwrap().get(token).cloned()
    }

    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
    }

    /// Apply (or echo-pending) a suggestion. `confirm=false` returns the
    /// pending echo without consuming the token; `confirm=true` consumes
    /// it exactly once, translating the action into `RadioController`
    /// calls and triggering a radio restart when required.
    pub async fn apply(
        &self,
        token: &str,
        confirm: bool,
        controller: &dyn RadioController,
        latest_snapshot_timestamp: chrono::DateTime<Utc>,
    ) -> MeshResult<ApplyOutcome> {
        let suggestion = {
            let guard = self.pending.lock().unwrap();
            guard
                .get(token)
                .cloned()
                .ok_or_else(|| MeshError::UnknownSuggestion(token.to_string()))?
        };

        if suggestion.is_stale(latest_snapshot_timestamp) {
            self.pending.lock().unwrap().remove(token);
            return Err(MeshError::UnknownSuggestion(token.to_string()));
        }

        if !confirm {
            return Ok(ApplyOutcome::Pending(PendingConfirmation {
                token: suggestion.token.clone(),
                category: suggestion.category,
                current_value: suggestion.current_value.clone(),
                target_value: suggestion.target_value.clone(),
                risk: suggestion.risk,
            }));
        }

        apply_action(controller, &suggestion.action).await?;
        self.pending.lock().unwrap().remove(token);
        info!(token, "suggestion applied");
        Ok(ApplyOutcome::Applied { rescan_hint: true })
    }
}

fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsentinel_common::{Backhaul, Band, Node, SourceHealth};
    use std::collections::HashMap as StdHashMap;

    struct NoopController;

    #[async_trait::async_trait]
    impl RadioController for NoopController {
        async fn set_channel(&self, _node_id: &str, _band: Band, _channel: u16) -> MeshResult<()> {
            Ok(())
        }
        async fn toggle_feature(&self, _node_id: &str, _band: Band, _feature: &str, _enable: bool) -> MeshResult<()> {
            Ok(())
        }
        async fn set_backhaul(&self, _node_id: &str, _wired: bool) -> MeshResult<()> {
            Ok(())
        }
        async fn disable_ap_feature(&self, _node_id: &str, _feature: &str) -> MeshResult<()> {
            Ok(())
        }
        async fn restart_radio(&self, _node_id: &str) -> MeshResult<()> {
            Ok(())
        }
    }

    fn empty_snapshot() -> meshsentinel_common::NetworkSnapshot {
        meshsentinel_common::NetworkSnapshot {
            timestamp: Utc::now(),
            nodes: vec![Node {
                id: "n1".to_string(),
                hw_address: "aa:bb:cc:dd:ee:ff".to_string(),
                address: "10.0.0.1".parse().unwrap(),
                is_primary: true,
                backhaul: Backhaul::Wired,
                firmware: "1.0".to_string(),
                uptime_secs: 0,
                cpu_percent: 0.0,
                memory_percent: 0.0,
                connected_clients: 0,
            }],
            radios: Vec::new(),
            devices: Vec::new(),
            neighbor_aps: Vec::new(),
            zigbee: None,
            source_health: SourceHealth::default(),
        }
    }

    #[tokio::test]
    async fn apply_unknown_token_fails() {
        let engine = RecommendationEngine::new();
        let controller = NoopController;
        let err = engine
            .apply("missing", true, &controller, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::UnknownSuggestion(_)));
    }

    #[test]
    fn generate_produces_no_suggestions_with_no_candidates() {
        let engine = RecommendationEngine::new();
        let snapshot = empty_snapshot();
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[],
            zigbee_channel: None,
            backhaul_rssi: &StdHashMap::new(),
            primary_is_ap_mode: false,
            enabled_wan_features: &[],
        };
        let suggestions = engine.generate(&inputs, &[OptimisationTarget::MinimiseInterference]);
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn applying_twice_fails_the_second_time() {
        let engine = RecommendationEngine::new();
        let snapshot = empty_snapshot();
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[],
            zigbee_channel: None,
            backhaul_rssi: &StdHashMap::new(),
            primary_is_ap_mode: true,
            enabled_wan_features: &["qos".to_string()],
        };
        let suggestions = engine.generate(&inputs, &[OptimisationTarget::BalanceCoverage]);
        assert_eq!(suggestions.len(), 1);
        let token = suggestions[0].token.clone();

        let controller = NoopController;
        let now = Utc::now();
        let outcome = engine.apply(&token, true, &controller, now).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));

        let err = engine.apply(&token, true, &controller, now).await.unwrap_err();
        assert!(matches!(err, MeshError::UnknownSuggestion(_)));
    }

    #[tokio::test]
    async fn apply_without_confirm_leaves_the_token_valid() {
        let engine = RecommendationEngine::new();
        let snapshot = empty_snapshot();
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &[],
            zigbee_channel: None,
            backhaul_rssi: &StdHashMap::new(),
            primary_is_ap_mode: true,
            enabled_wan_features: &["qos".to_string()],
        };
        let suggestions = engine.generate(&inputs, &[OptimisationTarget::BalanceCoverage]);
        assert_eq!(suggestions.len(), 1);
        let token = suggestions[0].token.clone();

        let controller = NoopController;
        let now = Utc::now();

        let first = engine.apply(&token, false, &controller, now).await.unwrap();
        assert!(matches!(first, ApplyOutcome::Pending(_)));
        let second = engine.apply(&token, false, &controller, now).await.unwrap();
        assert!(matches!(second, ApplyOutcome::Pending(_)));

        let applied = engine.apply(&token, true, &controller, now).await.unwrap();
        assert!(matches!(applied, ApplyOutcome::Applied { .. }));
    }
}
