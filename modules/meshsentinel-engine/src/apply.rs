use async_trait::async_trait;
use meshsentinel_common::{MeshResult, SuggestionAction};

/// What `RecommendationEngine::apply` needs from its host — a thin seam
/// so this crate doesn't depend on `meshsentinel-deviceshell`/`-hub`
/// directly. `meshsentinel-dispatcher` implements this over the real
/// `DeviceShell`/`HubClient` collaborators.
#[async_trait]
pub trait RadioController: Send + Sync {
    async fn set_channel(&self, node_id: &str, band: meshsentinel_common::Band, channel: u16) -> MeshResult<()>;
    async fn toggle_feature(
        &self,
        node_id: &str,
        band: meshsentinel_common::Band,
        feature: &str,
        enable: bool,
    ) -> MeshResult<()>;
    async fn set_backhaul(&self, node_id: &str, wired: bool) -> MeshResult<()>;
    async fn disable_ap_feature(&self, node_id: &str, feature: &str) -> MeshResult<()>;
    async fn restart_radio(&self, node_id: &str) -> MeshResult<()>;
}

pub async fn apply_action(controller: &dyn RadioController, action: &SuggestionAction) -> MeshResult<()> {
    match action {
        SuggestionAction::SetChannel {
            node_id,
            band,
            channel,
            restart_radio,
        } => {
            controller.set_channel(node_id, *band, *channel).await?;
            if *restart_radio {
                controller.restart_radio(node_id).await?;
            }
            Ok(())
        }
        SuggestionAction::ToggleFeature {
            node_id,
            band,
            feature,
            enable,
        } => controller.toggle_feature(node_id, *band, feature, *enable).await,
        SuggestionAction::SetBackhaul { node_id, wired } => {
            controller.set_backhaul(node_id, *wired).await
        }
        SuggestionAction::DisableApFeature { node_id, feature } => {
            controller.disable_ap_feature(node_id, feature).await
        }
    }
}
