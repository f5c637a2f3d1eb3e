use meshsentinel_common::{Risk, SuggestionAction, SuggestionCategory};

/// Pre-token suggestion produced by a rule pack. `priority`/`confidence`
/// drive dedup and ordering; `RecommendationEngine::generate` converts
/// the survivors into `Suggestion`s with a freshly issued token.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub priority: i32,
    pub confidence: f32,
    pub category: SuggestionCategory,
    pub current_value: String,
    pub target_value: String,
    pub risk: Risk,
    pub expected_improvement: String,
    pub affected_devices: Vec<String>,
    pub action: SuggestionAction,
}

impl Candidate {
    /// Key used for deduplication: `(actionType, parameters)` per spec
    /// §4.9. Actions differ by their structural shape, so a stringified
    /// discriminant plus payload is sufficient without hand-rolling a
    /// parallel enum of keys.
    pub fn dedup_key(&self) -> String {
        match &self.action {
            SuggestionAction::SetChannel {
                node_id,
                band,
                channel,
                ..
            } => format!("set_channel:{node_id}:{band:?}:{channel}"),
            SuggestionAction::ToggleFeature {
                node_id,
                band,
                feature,
                enable,
            } => format!("toggle_feature:{node_id}:{band:?}:{feature}:{enable}"),
            SuggestionAction::SetBackhaul { node_id, wired } => {
                format!("set_backhaul:{node_id}:{wired}")
            }
            SuggestionAction::DisableApFeature { node_id, feature } => {
                format!("disable_ap_feature:{node_id}:{feature}")
            }
        }
    }
}
