use std::sync::Arc;

use async_trait::async_trait;
use meshsentinel_common::{Band, MeshResult};
use meshsentinel_deviceshell::{MeshDeviceShell, MeshNodePool};
use meshsentinel_engine::RadioController;

/// The literal node id `SnapshotBuilder`/`parsing::parse_system_info`
/// assigns the primary device, distinguishing it from peer node ids
/// (which are peer hardware addresses).
pub(crate) const PRIMARY_NODE_ID: &str = "primary";

/// Concrete `RadioController` the dispatcher hands to
/// `RecommendationEngine::apply` and uses directly for `setWifiChannel`.
/// Translates each action into `kv set` + `kv commit` calls over the
/// primary `DeviceShell` or the right peer in the `NodePool`.
pub struct MeshRadioController {
    primary: Arc<MeshDeviceShell>,
    pool: Arc<MeshNodePool>,
}

impl MeshRadioController {
    pub fn new(primary: Arc<MeshDeviceShell>, pool: Arc<MeshNodePool>) -> Self {
        Self { primary, pool }
    }

    async fn set_kv_and_commit(&self, node_id: &str, key: &str, value: &str) -> MeshResult<()> {
        if node_id == PRIMARY_NODE_ID {
            self.primary.set_kv(key, value).await?;
            self.primary.commit().await
        } else {
            self.pool.exec_on(node_id, &format!("kv set {key} {value}")).await?;
            self.pool.exec_on(node_id, "kv commit").await?;
            Ok(())
        }
    }
}

#[async_trait]
impl RadioController for MeshRadioController {
    async fn set_channel(&self, node_id: &str, band: Band, channel: u16) -> MeshResult<()> {
        self.set_kv_and_commit(node_id, &format!("radio.{band:?}.channel"), &channel.to_string())
            .await
    }

    async fn toggle_feature(&self, node_id: &str, band: Band, feature: &str, enable: bool) -> MeshResult<()> {
        self.set_kv_and_commit(node_id, &format!("radio.{band:?}.{feature}"), &enable.to_string())
            .await
    }

    async fn set_backhaul(&self, node_id: &str, wired: bool) -> MeshResult<()> {
        self.set_kv_and_commit(node_id, "backhaul.wired", &wired.to_string()).await
    }

    async fn disable_ap_feature(&self, node_id: &str, feature: &str) -> MeshResult<()> {
        self.set_kv_and_commit(node_id, &format!("wan.{feature}"), "false").await
    }

    async fn restart_radio(&self, node_id: &str) -> MeshResult<()> {
        if node_id == PRIMARY_NODE_ID {
            self.primary.restart_radio().await
        } else {
            self.pool.exec_on(node_id, "wifi restart").await.map(|_| ())
        }
    }
}
