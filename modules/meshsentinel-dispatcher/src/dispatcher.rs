//! `ActionDispatcher` (spec §4.10): routes a tagged `Action` to the
//! right collaborator, lazily connecting whatever transport the handler
//! needs, and always returns a `Response` — never throws.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use futures::FutureExt;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshsentinel_alerts::{AlertRouter, AlertThreshold};
use meshsentinel_common::{
    canonical_hw_address, Band, ChannelPlan, Config, DeviceStatus, HealthScore, Link, MeshError,
    MeshResult, NetworkSnapshot, NodePosition, Suggestion,
};
use meshsentinel_core::{derive_problems, MetricsSink, ScanPhase, SnapshotBuilder};
use meshsentinel_deviceshell::{DeviceShell, MeshDeviceShell, MeshNodePool, NodePool, ShellCredentials};
use meshsentinel_engine::{ApplyOutcome, OptimisationTarget, RecommendationEngine};
use meshsentinel_hub::HubClient;
use meshsentinel_knowledge::{ConnectionEvent, KnowledgeBase, OptimisationRecord};
use meshsentinel_signal::{
    ChannelRecommendation, NodePositionStore, SignalStore, SpectrumAnalyser, Triangulator,
};
use meshsentinel_snmp::SnmpClient;

use crate::action::{Action, DeviceFilter};
use crate::controller::{MeshRadioController, PRIMARY_NODE_ID};
use crate::response::Response;

/// Default target set for `fullIntelligenceScan` when the caller passes
/// an empty list.
const ALL_TARGETS: [OptimisationTarget; 6] = [
    OptimisationTarget::MinimiseInterference,
    OptimisationTarget::ProtectZigbee,
    OptimisationTarget::ReduceNeighborOverlap,
    OptimisationTarget::MaximiseThroughput,
    OptimisationTarget::ImproveRoaming,
    OptimisationTarget::BalanceCoverage,
];

const DEFAULT_SIGNAL_HISTORY_HOURS: u32 = 24;
const DEFAULT_SIGNAL_HISTORY_LIMIT: usize = 500;
/// Assumed inter-floor spacing used to default a node position's `z`
/// when a caller omits it (leaves it at the struct's zero default) but
/// does set a non-ground `floor` (spec §8 round-trip property).
const ASSUMED_FLOOR_HEIGHT_M: f64 = 3.0;

struct LastScan {
    snapshot: NetworkSnapshot,
    health: HealthScore,
    suggestions: Vec<Suggestion>,
}

/// Orchestrates every collaborator behind the fixed action catalogue
/// (spec §6). Single-flight per instance: `execute` is serialised by an
/// internal lock so concurrent submissions queue rather than race.
pub struct ActionDispatcher {
    config: Config,
    primary: Arc<MeshDeviceShell>,
    pool: Arc<MeshNodePool>,
    hub: AsyncMutex<Option<Arc<HubClient>>>,
    snmp: Arc<SnmpClient>,
    engine: Arc<RecommendationEngine>,
    signal_store: Arc<SignalStore>,
    positions: NodePositionStore,
    triangulator: Triangulator,
    knowledge: Arc<KnowledgeBase>,
    alert_router: Arc<AlertRouter>,
    metrics: Arc<dyn MetricsSink>,
    controller: MeshRadioController,
    last: AsyncMutex<Option<LastScan>>,
    execute_lock: AsyncMutex<()>,
    accepting: AtomicBool,
    ready: AtomicBool,
    shutdown_token: CancellationToken,
}

impl ActionDispatcher {
    pub fn new(
        config: Config,
        knowledge: Arc<KnowledgeBase>,
        alert_router: Arc<AlertRouter>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let primary = Arc::new(DeviceShell::new(ShellCredentials {
            host: config.router.host.clone(),
            port: config.router.ssh_port,
            user: config.router.ssh_user.clone(),
            password: config.router.ssh_password.clone(),
            key_path: config.router.ssh_key_path.clone(),
        }));
        let pool = Arc::new(NodePool::new(
            config.router.ssh_port,
            config.router.ssh_user.clone(),
            config.router.ssh_password.clone(),
            config.router.ssh_key_path.clone(),
        ));
        let signal_store = Arc::new(SignalStore::new(config.scan.signal_history_retention_days));
        let engine = Arc::new(RecommendationEngine::new());
        let controller = MeshRadioController::new(primary.clone(), pool.clone());

        Self {
            triangulator: Triangulator::new(config.triangulation.path_loss_exponent, config.triangulation.reference_rssi_dbm),
            snmp: Arc::new(SnmpClient::new()),
            config,
            primary,
            pool,
            hub: AsyncMutex::new(None),
            engine,
            signal_store,
            positions: NodePositionStore::new(),
            knowledge,
            alert_router,
            metrics,
            controller,
            last: AsyncMutex::new(None),
            execute_lock: AsyncMutex::new(()),
            accepting: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Connect the primary `DeviceShell` and mark the dispatcher ready to
    /// accept actions. Must succeed before any action beyond
    /// `getMetrics`/`resetCircuitBreaker` is meaningful.
    pub async fn initialize(&self) -> MeshResult<()> {
        self.primary.connect().await?;
        self.ready.store(true, Ordering::SeqCst);
        info!("action dispatcher ready");
        Ok(())
    }

    async fn ensure_hub(&self) -> MeshResult<Option<Arc<HubClient>>> {
        if self.config.hub.host.is_empty() {
            return Ok(None);
        }
        let mut guard = self.hub.lock().await;
        if guard.is_none() {
            let client = HubClient::connect(&self.config.hub).await?;
            *guard = Some(Arc::new(client));
        }
        Ok(guard.clone())
    }

    /// Stop accepting new actions, wait for the in-flight one to drain,
    /// disconnect every transport and flush the knowledge base (spec
    /// §5's shutdown sequence).
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();
        let _drain = self.execute_lock.lock().await;
        self.primary.disconnect().await;
        if let Some(hub) = self.hub.lock().await.take() {
            drop(hub);
        }
        if let Err(e) = self.knowledge.flush().await {
            warn!(error = %e, "knowledge base flush failed during shutdown");
        }
        info!("action dispatcher shut down");
    }

    /// Execute one action, recording its name/parameters and latency to
    /// the metrics sink, and catching any handler panic as an error
    /// response rather than propagating it.
    pub async fn execute(&self, action: Action) -> Response {
        let name = action.name();
        if !self.accepting.load(Ordering::SeqCst) {
            return Response::err(name, "dispatcher is shutting down");
        }
        if !self.ready.load(Ordering::SeqCst)
            && !matches!(action, Action::GetMetrics | Action::ResetCircuitBreaker { .. })
        {
            return Response::err_with_hint(
                name,
                "dispatcher is not initialized",
                "call initialize() before issuing actions",
            );
        }

        let _single_flight = self.execute_lock.lock().await;
        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.dispatch(action)).catch_unwind().await;
        let response = match outcome {
            Ok(response) => response,
            Err(_) => Response::err(name, "handler panicked"),
        };
        self.metrics.record_action(name, start.elapsed(), response.success);
        response
    }

    async fn dispatch(&self, action: Action) -> Response {
        let cancel = self.shutdown_token.child_token();
        match action {
            Action::ScanNetwork { targets } => self.handle_scan(&targets, &cancel).await,
            Action::FullIntelligenceScan { targets } => {
                let targets = if targets.is_empty() { ALL_TARGETS.to_vec() } else { targets };
                self.handle_scan(&targets, &cancel).await
            }
            Action::NetworkHealth => self.handle_network_health().await,
            Action::DeviceList { filter } => self.handle_device_list(filter).await,
            Action::DeviceDetails { addr } => self.handle_device_details(&addr).await,
            Action::DeviceSignalHistory { addr, hours } => self.handle_signal_history(&addr, hours).await,
            Action::MeshNodes => self.handle_mesh_nodes().await,
            Action::WifiSettings => self.handle_wifi_settings().await,
            Action::SetWifiChannel { band, channel } => self.handle_set_wifi_channel(band, channel).await,
            Action::Problems { severity } => self.handle_problems(severity).await,
            Action::OptimizationSuggestions => self.handle_optimization_suggestions().await,
            Action::ApplyOptimization { token, confirm } => self.handle_apply_optimization(&token, confirm).await,
            Action::ScanZigbee => self.handle_scan_zigbee().await,
            Action::FrequencyConflicts => self.handle_frequency_conflicts().await,
            Action::TriangulateDevices { addr } => self.handle_triangulate(addr.as_deref()).await,
            Action::SetNodePosition3D { position } => self.handle_set_node_position(position).await,
            Action::GetNodePositions => self.handle_get_node_positions().await,
            Action::RecordSignalMeasurement { device_addr, node_addr, rssi } => {
                self.handle_record_signal_measurement(&device_addr, &node_addr, rssi).await
            }
            Action::DetectWalls { floor } => self.handle_detect_walls(floor).await,
            Action::GetEnvironmentSummary => self.handle_environment_summary().await,
            Action::ConfigureAlerts { min_severity, cooldown_secs } => {
                self.handle_configure_alerts(min_severity, cooldown_secs).await
            }
            Action::GetAlerts { hours } => self.handle_get_alerts(hours).await,
            Action::ResetCircuitBreaker { node_id } => self.handle_reset_circuit_breaker(node_id).await,
            Action::GetMetrics => self.handle_get_metrics().await,
        }
    }

    async fn handle_scan(&self, targets: &[OptimisationTarget], cancel: &CancellationToken) -> Response {
        let name = "scanNetwork";
        if self.ensure_hub().await.is_err() {
            warn!("hub connect failed, scan will proceed without it");
        }
        let hub = self.hub.lock().await.clone();
        // `SnapshotBuilder` was built without a hub at construction time
        // (the hub may not have been configured yet); if one connected
        // lazily since then, hand it the same builder has no setter, so
        // route the hub-bound phase through a direct rebuild here.
        let builder = if hub.is_some() {
            SnapshotBuilder::new(
                self.primary.clone(),
                self.pool.clone(),
                hub,
                Some(self.snmp.clone()),
                self.config.clone(),
                self.signal_store.clone(),
                self.engine.clone(),
            )
        } else {
            SnapshotBuilder::new(
                self.primary.clone(),
                self.pool.clone(),
                None,
                Some(self.snmp.clone()),
                self.config.clone(),
                self.signal_store.clone(),
                self.engine.clone(),
            )
        };

        match builder.scan(targets, cancel).await {
            Ok(meshsentinel_core::ScanOutcome::AlreadyInProgress { phase }) => {
                Response::ok_with_hint(name, json!({ "phase": phase_label(phase) }), "a scan is already running")
            }
            Ok(meshsentinel_core::ScanOutcome::Completed {
                snapshot,
                health,
                suggestions,
                snmp_results,
            }) => {
                let problems = derive_problems(&snapshot, &health);
                self.alert_router.route(&problems).await;

                let previous_devices = self.last.lock().await.as_ref().map(|l| l.snapshot.devices.clone());
                for event in connection_events(previous_devices.as_deref(), &snapshot.devices) {
                    self.knowledge.record_connection_event(event).await;
                }

                self.knowledge.record_snapshot(snapshot.clone()).await;
                for device in &snapshot.devices {
                    self.knowledge
                        .touch_device(&device.hw_address, device.hostname.clone(), device.vendor.clone())
                        .await;
                }

                let payload = json!({
                    "snapshot": snapshot,
                    "health": health,
                    "suggestions": suggestions,
                    "snmp": snmp_results,
                    "problemCount": problems.len(),
                });
                *self.last.lock().await = Some(LastScan { snapshot, health, suggestions });
                Response::ok(name, payload)
            }
            Err(e) => Response::err(name, e),
        }
    }

    async fn handle_network_health(&self) -> Response {
        let name = "networkHealth";
        match &*self.last.lock().await {
            Some(last) => Response::ok(name, &last.health),
            None => Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first"),
        }
    }

    async fn handle_device_list(&self, filter: DeviceFilter) -> Response {
        let name = "deviceList";
        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };
        let devices: Vec<_> = last
            .snapshot
            .devices
            .iter()
            .filter(|d| match filter {
                DeviceFilter::All => true,
                DeviceFilter::Wireless => !matches!(d.link, Link::Wired),
                DeviceFilter::Wired => matches!(d.link, Link::Wired),
                DeviceFilter::Problematic => matches!(d.status, DeviceStatus::Offline | DeviceStatus::Unstable),
            })
            .collect();
        Response::ok(name, devices)
    }

    async fn handle_device_details(&self, addr: &str) -> Response {
        let name = "deviceDetails";
        let canonical = canonical_hw_address(addr);
        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };
        match last.snapshot.devices.iter().find(|d| d.hw_address == canonical) {
            Some(device) => Response::ok(name, device),
            None => Response::err(name, MeshError::UnknownDevice(canonical)),
        }
    }

    async fn handle_signal_history(&self, addr: &str, hours: Option<u32>) -> Response {
        let canonical = canonical_hw_address(addr);
        let since = Utc::now() - ChronoDuration::hours(hours.unwrap_or(DEFAULT_SIGNAL_HISTORY_HOURS) as i64);
        let samples = self
            .signal_store
            .history_since(&canonical, since, DEFAULT_SIGNAL_HISTORY_LIMIT);
        Response::ok("deviceSignalHistory", samples)
    }

    async fn handle_mesh_nodes(&self) -> Response {
        let peers = self.pool.nodes().await;
        let snapshot_nodes = self.last.lock().await.as_ref().map(|l| l.snapshot.nodes.clone());
        Response::ok("meshNodes", json!({ "peers": peers, "nodes": snapshot_nodes }))
    }

    async fn handle_wifi_settings(&self) -> Response {
        let name = "wifiSettings";
        match &*self.last.lock().await {
            Some(last) => Response::ok(name, &last.snapshot.radios),
            None => Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first"),
        }
    }

    async fn handle_set_wifi_channel(&self, band: Band, channel: u16) -> Response {
        let name = "setWifiChannel";
        if !ChannelPlan::is_valid(band, channel) {
            return Response::err(name, MeshError::Invariant(format!("channel {channel} is not valid for {band:?}")));
        }
        if let Err(e) = self.controller_set_channel(PRIMARY_NODE_ID, band, channel).await {
            return Response::err(name, e);
        }
        Response::ok_with_hint(name, json!({ "band": band, "channel": channel }), "rescan recommended to confirm the change")
    }

    async fn controller_set_channel(&self, node_id: &str, band: Band, channel: u16) -> MeshResult<()> {
        use meshsentinel_engine::RadioController;
        self.controller.set_channel(node_id, band, channel).await?;
        self.controller.restart_radio(node_id).await
    }

    async fn handle_problems(&self, severity: Option<meshsentinel_alerts::ProblemSeverity>) -> Response {
        let name = "problems";
        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };
        let mut problems = derive_problems(&last.snapshot, &last.health);
        if let Some(floor) = severity {
            problems.retain(|p| p.severity >= floor);
        }
        Response::ok(name, problems)
    }

    async fn handle_optimization_suggestions(&self) -> Response {
        let name = "optimizationSuggestions";
        match &*self.last.lock().await {
            Some(last) => Response::ok(name, &last.suggestions),
            None => Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first"),
        }
    }

    async fn handle_apply_optimization(&self, token: &str, confirm: bool) -> Response {
        let name = "applyOptimization";
        let latest_timestamp = match &*self.last.lock().await {
            Some(last) => last.snapshot.timestamp,
            None => Utc::now(),
        };
        let suggestion = self.engine.suggestion(token);
        match self.engine.apply(token, confirm, &self.controller, latest_timestamp).await {
            Ok(ApplyOutcome::Pending(pending)) => Response::ok(
                name,
                json!({
                    "token": pending.token,
                    "category": pending.category,
                    "currentValue": pending.current_value,
                    "targetValue": pending.target_value,
                    "risk": pending.risk,
                    "pending": true,
                }),
            ),
            Ok(ApplyOutcome::Applied { rescan_hint }) => {
                if let Some(suggestion) = suggestion {
                    self.knowledge
                        .record_optimisation(OptimisationRecord {
                            token: token.to_string(),
                            applied_at: Utc::now(),
                            category: format!("{:?}", suggestion.category),
                            description: format!("{} -> {}", suggestion.current_value, suggestion.target_value),
                        })
                        .await;
                }
                let mut response = Response::ok(name, json!({ "token": token, "applied": true }));
                if rescan_hint {
                    response.suggestions.push("rescan the network to confirm the change took effect".to_string());
                }
                response
            }
            Err(e) => Response::err(name, e),
        }
    }

    async fn handle_scan_zigbee(&self) -> Response {
        let name = "scanZigbee";
        let hub = match self.ensure_hub().await {
            Ok(Some(hub)) => hub,
            Ok(None) => return Response::err_with_hint(name, "no home-automation hub configured", "set `hub.host` in the configuration"),
            Err(e) => return Response::err(name, e),
        };
        let (network, devices) = match tokio::try_join!(hub.get_zigbee_network(), hub.get_zigbee_devices()) {
            Ok(pair) => pair,
            Err(e) => return Response::err(name, e),
        };
        match meshsentinel_core::parse_zigbee_network(&network, &devices) {
            Ok(zigbee) => Response::ok(name, zigbee),
            Err(e) => Response::err(name, e),
        }
    }

    async fn handle_frequency_conflicts(&self) -> Response {
        let name = "frequencyConflicts";
        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };
        let recs = channel_recommendations(&last.snapshot);
        Response::ok(name, recs)
    }

    async fn handle_triangulate(&self, addr: Option<&str>) -> Response {
        let name = "triangulateDevices";
        let nodes = self.positions.all();
        if nodes.is_empty() {
            return Response::err_with_hint(
                name,
                MeshError::InsufficientData("no node positions configured".to_string()),
                "call setNodePosition3D for at least one node first",
            );
        }

        let targets: Vec<String> = match addr {
            Some(addr) => vec![canonical_hw_address(addr)],
            None => {
                let guard = self.last.lock().await;
                match guard.as_ref() {
                    Some(last) => last
                        .snapshot
                        .devices
                        .iter()
                        .filter(|d| !matches!(d.link, Link::Wired))
                        .map(|d| d.hw_address.clone())
                        .collect(),
                    None => return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first"),
                }
            }
        };

        let mut positions = Vec::new();
        let mut errors = Vec::new();
        for device_addr in targets {
            let samples = self.signal_store.last_per_node(&device_addr);
            match self.triangulator.locate(&device_addr, &samples, &nodes) {
                Ok(position) => positions.push(position),
                Err(e) => errors.push(format!("{device_addr}: {e}")),
            }
        }

        if positions.is_empty() && !errors.is_empty() {
            return Response::err(name, errors.join("; "));
        }
        Response::ok(name, json!({ "positions": positions, "errors": errors }))
    }

    async fn handle_set_node_position(&self, mut position: NodePosition) -> Response {
        if position.z == 0.0 && position.floor != 0 && position.floor != i32::MAX {
            position.z = position.floor as f64 * ASSUMED_FLOOR_HEIGHT_M;
        }
        self.positions.set(position.clone());
        Response::ok("setNodePosition3D", position)
    }

    async fn handle_get_node_positions(&self) -> Response {
        Response::ok("getNodePositions", self.positions.all())
    }

    async fn handle_record_signal_measurement(&self, device_addr: &str, node_addr: &str, rssi: i32) -> Response {
        let sample = meshsentinel_common::SignalSample {
            timestamp: Utc::now(),
            device_addr: canonical_hw_address(device_addr),
            node_addr: canonical_hw_address(node_addr),
            rssi,
            channel: None,
            width_mhz: None,
            rate_mbps: None,
        };
        self.signal_store.append(sample.clone());
        Response::ok("recordSignalMeasurement", sample)
    }

    async fn handle_detect_walls(&self, floor: Option<i32>) -> Response {
        let name = "detectWalls";
        let nodes = self.positions.all();
        if nodes.is_empty() {
            return Response::err_with_hint(
                name,
                MeshError::InsufficientData("no node positions configured".to_string()),
                "call setNodePosition3D for at least one node first",
            );
        }

        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };

        let mut out = Vec::new();
        for device in last.snapshot.devices.iter().filter(|d| !matches!(d.link, Link::Wired)) {
            let samples = self.signal_store.last_per_node(&device.hw_address);
            let Ok(position) = self.triangulator.locate(&device.hw_address, &samples, &nodes) else {
                continue;
            };
            if let Some(floor) = floor {
                if position.floor != floor {
                    continue;
                }
            }
            let history = self.signal_store.recent(&device.hw_address, DEFAULT_SIGNAL_HISTORY_LIMIT);
            let walls = meshsentinel_signal::infer_walls(
                &history,
                |node_id| nodes.get(node_id).cloned(),
                self.config.triangulation.path_loss_exponent,
                self.config.triangulation.reference_rssi_dbm,
                (position.x, position.y),
            );
            if !walls.is_empty() {
                out.push(json!({ "deviceAddr": device.hw_address, "walls": walls_to_json(&walls) }));
            }
        }
        Response::ok(name, out)
    }

    async fn handle_environment_summary(&self) -> Response {
        let name = "getEnvironmentSummary";
        let guard = self.last.lock().await;
        let Some(last) = guard.as_ref() else {
            return Response::err_with_hint(name, "no snapshot available yet", "run scanNetwork first");
        };
        let problems = derive_problems(&last.snapshot, &last.health);
        Response::ok(
            name,
            json!({
                "timestamp": last.snapshot.timestamp,
                "health": last.health,
                "problemCount": problems.len(),
                "suggestionCount": last.suggestions.len(),
                "nodeCount": last.snapshot.nodes.len(),
                "deviceCount": last.snapshot.devices.len(),
                "zigbeePresent": last.snapshot.zigbee.is_some(),
                "sourceHealth": last.snapshot.source_health,
            }),
        )
    }

    async fn handle_configure_alerts(&self, min_severity: meshsentinel_alerts::ProblemSeverity, cooldown_secs: u64) -> Response {
        self.alert_router.reconfigure_threshold(AlertThreshold { min_severity, cooldown_secs });
        Response::ok("configureAlerts", self.alert_router.threshold())
    }

    async fn handle_get_alerts(&self, hours: u32) -> Response {
        let since = Utc::now() - ChronoDuration::hours(hours as i64);
        Response::ok("getAlerts", self.alert_router.history_since(since))
    }

    async fn handle_reset_circuit_breaker(&self, node_id: Option<String>) -> Response {
        let name = "resetCircuitBreaker";
        match node_id.as_deref() {
            None => {
                self.primary.reset_circuit();
                self.pool.reset_all_circuits().await;
                Response::ok(name, json!({ "reset": "all" }))
            }
            Some(id) if id == PRIMARY_NODE_ID => {
                self.primary.reset_circuit();
                Response::ok(name, json!({ "reset": PRIMARY_NODE_ID }))
            }
            Some(id) => match self.pool.reset_circuit(id).await {
                Ok(()) => Response::ok(name, json!({ "reset": id })),
                Err(e) => Response::err(name, e),
            },
        }
    }

    async fn handle_get_metrics(&self) -> Response {
        Response::ok("getMetrics", self.metrics.snapshot())
    }
}

fn phase_label(phase: ScanPhase) -> &'static str {
    match phase {
        ScanPhase::CollectingRouter => "collectingRouter",
        ScanPhase::ScanningNeighbors => "scanningNeighbors",
        ScanPhase::CollectingHub => "collectingHub",
        ScanPhase::CollectingSnmp => "collectingSnmp",
        ScanPhase::Analysing => "analysing",
        ScanPhase::GeneratingRecommendations => "generatingRecommendations",
    }
}

/// Recompute per-band channel recommendations from an already-published
/// snapshot (used by `frequencyConflicts`), rather than re-running the
/// device I/O `SnapshotBuilder` needs to gather a fresh one.
fn channel_recommendations(snapshot: &NetworkSnapshot) -> Vec<ChannelRecommendation> {
    let zigbee_channel = snapshot.zigbee.as_ref().map(|z| z.coordinator_channel);
    let mut out = Vec::new();
    for band in [Band::Band24, Band::Band5, Band::Band5Alt, Band::Band6] {
        let Some(current_channel) = snapshot.radios.iter().find(|r| r.band == band).map(|r| r.channel) else {
            continue;
        };
        let scans = SpectrumAnalyser::aggregate(&snapshot.neighbor_aps, band);
        let zigbee = if band == Band::Band24 { zigbee_channel } else { None };
        if let Ok(rec) = SpectrumAnalyser::recommend_channel(&scans, band, current_channel, zigbee) {
            out.push(rec);
        }
    }
    out
}

fn walls_to_json(walls: &[meshsentinel_signal::WallSegment]) -> Vec<serde_json::Value> {
    walls
        .iter()
        .map(|w| {
            json!({
                "midpointX": w.midpoint_x,
                "midpointY": w.midpoint_y,
                "material": w.material,
                "sampleCount": w.sample_count,
                "confidence": w.confidence,
            })
        })
        .collect()
}

/// Diff two device rosters into attach/detach/roam events for the
/// knowledge base's connection-event ring. `previous` is `None` on the
/// first scan, which produces no events.
fn connection_events(
    previous: Option<&[meshsentinel_common::Device]>,
    current: &[meshsentinel_common::Device],
) -> Vec<ConnectionEvent> {
    use meshsentinel_knowledge::ConnectionEventKind;

    let Some(previous) = previous else {
        return Vec::new();
    };
    let now = Utc::now();
    let mut events = Vec::new();

    for device in current {
        match previous.iter().find(|d| d.hw_address == device.hw_address) {
            None => events.push(ConnectionEvent {
                timestamp: now,
                hw_address: device.hw_address.clone(),
                kind: ConnectionEventKind::Connected,
            }),
            Some(prior) if prior.attached_node != device.attached_node => events.push(ConnectionEvent {
                timestamp: now,
                hw_address: device.hw_address.clone(),
                kind: ConnectionEventKind::Roamed,
            }),
            Some(_) => {}
        }
    }
    for prior in previous {
        if !current.iter().any(|d| d.hw_address == prior.hw_address) {
            events.push(ConnectionEvent {
                timestamp: now,
                hw_address: prior.hw_address.clone(),
                kind: ConnectionEventKind::Disconnected,
            });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_cover_every_optimisation_target() {
        assert_eq!(ALL_TARGETS.len(), 6);
    }
}
