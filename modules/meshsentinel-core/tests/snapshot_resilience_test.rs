//! Literal scenario: with the hub unreachable but the primary shell
//! healthy, `scanNetwork` still returns success, with
//! `source_health.hub_available == false` and router data populated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshsentinel_common::{Config, MeshResult};
use meshsentinel_core::{ScanOutcome, SnapshotBuilder};
use meshsentinel_deviceshell::{DeviceShell, NodePool, ShellCredentials, ShellTransport};
use meshsentinel_engine::RecommendationEngine;
use meshsentinel_signal::SignalStore;
use tokio_util::sync::CancellationToken;

struct HealthyRouterTransport;

#[async_trait]
impl ShellTransport for HealthyRouterTransport {
    async fn connect(_creds: &ShellCredentials) -> MeshResult<Self> {
        Ok(Self)
    }

    async fn exec(&mut self, command: &str, _deadline: Duration) -> MeshResult<String> {
        match command {
            "system info" => Ok(serde_json::json!({
                "hw_address": "aa:bb:cc:dd:ee:02",
                "address": "192.168.1.1",
                "firmware": "2.1",
                "uptime_secs": 7200,
                "cpu_percent": 8.0,
                "memory_percent": 15.0,
                "connected_clients": 3,
                "wired_backhaul": true,
                "ap_mode": false
            })
            .to_string()),
            "radio info" => Ok("[]".to_string()),
            "client list" => Ok("[]".to_string()),
            "wan features" => Ok("[]".to_string()),
            "mesh peers" => Ok(String::new()),
            other => Ok(format!("unhandled:{other}")),
        }
    }

    async fn disconnect(&mut self) {}

    fn is_connected(&self) -> bool {
        true
    }
}

fn credentials() -> ShellCredentials {
    ShellCredentials {
        host: "192.168.1.1".to_string(),
        port: 22,
        user: "admin".to_string(),
        password: Some("pw".to_string()),
        key_path: None,
    }
}

#[tokio::test]
async fn scan_succeeds_despite_hub_unavailability() {
    let primary = Arc::new(DeviceShell::<HealthyRouterTransport>::new(credentials()));
    primary.connect().await.unwrap();
    let pool: Arc<NodePool<HealthyRouterTransport>> =
        Arc::new(NodePool::new(22, "admin".to_string(), Some("pw".to_string()), None));

    let builder = SnapshotBuilder::new(
        primary,
        pool,
        None, // no HubClient wired up: the hub source is unavailable for this scan
        None,
        Config::default(),
        Arc::new(SignalStore::new(7)),
        Arc::new(RecommendationEngine::new()),
    );

    let outcome = builder.scan(&[], &CancellationToken::new()).await.unwrap();
    match outcome {
        ScanOutcome::Completed { snapshot, .. } => {
            assert!(snapshot.source_health.router_available);
            assert!(!snapshot.source_health.hub_available);
            assert_eq!(snapshot.nodes.len(), 1);
            assert!(snapshot.nodes[0].is_primary);
            assert_eq!(snapshot.nodes[0].firmware, "2.1");
        }
        ScanOutcome::AlreadyInProgress { .. } => panic!("expected the scan to complete"),
    }
}
