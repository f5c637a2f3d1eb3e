//! `SnapshotBuilder` (spec §4.8): the bounded six-phase pipeline that
//! orchestrates one scan across every collaborator and produces a fresh
//! `NetworkSnapshot` plus an environment `HealthScore` and a ranked set
//! of `Suggestion`s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshsentinel_common::{
    Band, Config, Device, MeshError, MeshResult, NetworkSnapshot, Node, Radio, SignalSample,
    SourceHealth, Suggestion, Backhaul, HealthScore,
};
use meshsentinel_deviceshell::{DeviceShell, NodePool, ShellTransport};
use meshsentinel_engine::{OptimisationTarget, RecommendationEngine, RuleInputs};
use meshsentinel_hub::HubClient;
use meshsentinel_signal::{ChannelRecommendation, ChannelScan, SignalStore, SpectrumAnalyser};
use meshsentinel_snmp::{SnmpClient, SwitchWalkResult};

use crate::health::compute_health_score;
use crate::parsing;

/// Below this window, a repeat RSSI reading for the same (device, node)
/// pair is treated as a duplicate and skipped (spec §4.8).
const CROSS_NODE_DEDUP_WINDOW: chrono::Duration = chrono::Duration::seconds(60);
const PEER_FAN_OUT_DEADLINE: Duration = Duration::from_secs(10);

/// Bands a scan probes for neighbor interference, in the fixed order
/// `scanningNeighbors` reports progress against.
const SCANNED_BANDS: [Band; 2] = [Band::Band24, Band::Band5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanPhase {
    CollectingRouter,
    ScanningNeighbors,
    CollectingHub,
    CollectingSnmp,
    Analysing,
    GeneratingRecommendations,
}

impl ScanPhase {
    fn label(self) -> &'static str {
        match self {
            ScanPhase::CollectingRouter => "collectingRouter",
            ScanPhase::ScanningNeighbors => "scanningNeighbors",
            ScanPhase::CollectingHub => "collectingHub",
            ScanPhase::CollectingSnmp => "collectingSnmp",
            ScanPhase::Analysing => "analysing",
            ScanPhase::GeneratingRecommendations => "generatingRecommendations",
        }
    }

    fn percent(self) -> u8 {
        match self {
            ScanPhase::CollectingRouter => 10,
            ScanPhase::ScanningNeighbors => 35,
            ScanPhase::CollectingHub => 55,
            ScanPhase::CollectingSnmp => 70,
            ScanPhase::Analysing => 85,
            ScanPhase::GeneratingRecommendations => 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub percent: u8,
    pub message: String,
}

/// Result of a `NetworkSnapshot` scan.
pub enum ScanOutcome {
    /// Another scan was already running; its current phase is echoed
    /// back rather than queuing this request (spec §4.8: "a
    /// scan-in-progress request returns immediately with the current
    /// phase").
    AlreadyInProgress { phase: ScanPhase },
    Completed {
        snapshot: NetworkSnapshot,
        health: HealthScore,
        suggestions: Vec<Suggestion>,
        snmp_results: Vec<SwitchWalkResult>,
    },
}

/// Orchestrates one scan across `DeviceShell` + `NodePool` + `HubClient`
/// + `SnmpClient` (spec §4.8). Owns the `SignalStore` write path and the
/// `RecommendationEngine` that turns the finished snapshot into
/// `Suggestion`s.
pub struct SnapshotBuilder<T: ShellTransport + 'static> {
    primary: Arc<DeviceShell<T>>,
    pool: Arc<NodePool<T>>,
    hub: Option<Arc<HubClient>>,
    snmp: Option<Arc<SnmpClient>>,
    config: Config,
    signal_store: Arc<SignalStore>,
    engine: Arc<RecommendationEngine>,
    progress: broadcast::Sender<ScanProgress>,
    scanning: AtomicBool,
    current_phase: std::sync::Mutex<Option<ScanPhase>>,
    last_cross_node: AsyncMutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl<T: ShellTransport + 'static> SnapshotBuilder<T> {
    pub fn new(
        primary: Arc<DeviceShell<T>>,
        pool: Arc<NodePool<T>>,
        hub: Option<Arc<HubClient>>,
        snmp: Option<Arc<SnmpClient>>,
        config: Config,
        signal_store: Arc<SignalStore>,
        engine: Arc<RecommendationEngine>,
    ) -> Self {
        let (progress, _) = broadcast::channel(32);
        Self {
            primary,
            pool,
            hub,
            snmp,
            config,
            signal_store,
            engine,
            progress,
            scanning: AtomicBool::new(false),
            current_phase: std::sync::Mutex::new(None),
            last_cross_node: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    fn emit(&self, phase: ScanPhase, message: impl Into<String>) {
        let message = message.into();
        *self.current_phase.lock().unwrap() = Some(phase);
        info!(phase = phase.label(), percent = phase.percent(), message = %message, "scan progress");
        let _ = self.progress.send(ScanProgress {
            phase,
            percent: phase.percent(),
            message,
        });
    }

    /// Run `Scan(targets)`. Never runs more than one scan concurrently;
    /// a request arriving mid-scan gets the current phase back instead
    /// of queuing (spec §4.8).
    pub async fn scan(
        &self,
        targets: &[OptimisationTarget],
        cancel: &CancellationToken,
    ) -> MeshResult<ScanOutcome> {
        if self.scanning.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            let phase = self.current_phase.lock().unwrap().unwrap_or(ScanPhase::CollectingRouter);
            return Ok(ScanOutcome::AlreadyInProgress { phase });
        }
        let result = self.run_scan(targets, cancel).await;
        self.scanning.store(false, Ordering::SeqCst);
        *self.current_phase.lock().unwrap() = None;
        result
    }

    async fn run_scan(&self, targets: &[OptimisationTarget], cancel: &CancellationToken) -> MeshResult<ScanOutcome> {
        let mut source_health = SourceHealth::default();
        let mut nodes: Vec<Node> = Vec::new();
        let mut radios: Vec<Radio> = Vec::new();
        let mut devices: Vec<Device> = Vec::new();
        let mut primary_is_ap_mode = false;
        let mut enabled_wan_features: Vec<String> = Vec::new();

        // Phase 1: collectingRouter
        self.emit(ScanPhase::CollectingRouter, "collecting primary and peer router state");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        self.collect_router(
            &mut source_health,
            &mut nodes,
            &mut radios,
            &mut devices,
            &mut primary_is_ap_mode,
            &mut enabled_wan_features,
        )
        .await;

        // Phase 2: scanningNeighbors
        self.emit(ScanPhase::ScanningNeighbors, "scanning for neighboring access points");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let mut neighbor_aps = Vec::new();
        let mut current_channels: HashMap<Band, u16> = HashMap::new();
        let scans_by_band = self
            .scan_neighbors(&radios, &mut source_health, &mut neighbor_aps, &mut current_channels)
            .await;

        // Phase 3: collectingHub
        self.emit(ScanPhase::CollectingHub, "collecting Zigbee network state from the hub");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let zigbee = self.collect_hub(&mut source_health).await;

        // Phase 4: collectingSnmp
        self.emit(ScanPhase::CollectingSnmp, "walking configured SNMP switches");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let snmp_results = self.collect_snmp(&mut source_health).await;

        // Channel recommendations need the Zigbee channel discovered in
        // phase 3, so they're finalised here rather than inside
        // `scan_neighbors` itself.
        let zigbee_channel_hint = zigbee.as_ref().map(|z| z.coordinator_channel);
        let mut channel_recs = Vec::new();
        for (band, current_channel) in &current_channels {
            let Some(scans) = scans_by_band.get(band) else {
                continue;
            };
            let zigbee_channel = if *band == Band::Band24 { zigbee_channel_hint } else { None };
            match SpectrumAnalyser::recommend_channel(scans, *band, *current_channel, zigbee_channel) {
                Ok(rec) => channel_recs.push(rec),
                Err(e) => warn!(error = %e, ?band, "channel recommendation unavailable"),
            }
        }

        // Phase 5: analysing
        self.emit(ScanPhase::Analysing, "merging snapshot and scoring environment health");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let snapshot = NetworkSnapshot {
            timestamp: Utc::now(),
            nodes,
            radios,
            devices,
            neighbor_aps,
            zigbee,
            source_health,
        };
        self.signal_store.sweep(snapshot.timestamp);
        let zigbee_overlap = snapshot.zigbee.as_ref().and_then(|z| {
            channel_recs
                .iter()
                .find(|r| r.band == Band::Band24)
                .map(|r| meshsentinel_signal::overlap_with_zigbee(r.current_channel, z.coordinator_channel))
        });
        let health = compute_health_score(&snapshot, &channel_recs, zigbee_overlap);

        // Phase 6: generatingRecommendations
        self.emit(ScanPhase::GeneratingRecommendations, "generating optimisation suggestions");
        if cancel.is_cancelled() {
            return Err(MeshError::Cancelled);
        }
        let backhaul_rssi = self.estimate_backhaul_rssi(&snapshot).await;
        let inputs = RuleInputs {
            snapshot: &snapshot,
            channel_recommendations: &channel_recs,
            zigbee_channel: snapshot.zigbee.as_ref().map(|z| z.coordinator_channel),
            backhaul_rssi: &backhaul_rssi,
            primary_is_ap_mode,
            enabled_wan_features: &enabled_wan_features,
        };
        let suggestions = self.engine.generate(&inputs, targets);

        Ok(ScanOutcome::Completed {
            snapshot,
            health,
            suggestions,
            snmp_results,
        })
    }

    async fn collect_router(
        &self,
        source_health: &mut SourceHealth,
        nodes: &mut Vec<Node>,
        radios: &mut Vec<Radio>,
        devices: &mut Vec<Device>,
        primary_is_ap_mode: &mut bool,
        enabled_wan_features: &mut Vec<String>,
    ) {
        match self.primary.exec("system info").await {
            Ok(raw) => match parsing::parse_system_info(&raw, "primary", true) {
                Ok(node) => {
                    *primary_is_ap_mode = parsing::parse_ap_mode(&raw);
                    nodes.push(node);
                    source_health.router_available = true;
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse primary system info");
                    source_health.errors.insert("router".to_string(), e.to_string());
                }
            },
            Err(e) => {
                warn!(error = %e, "primary system info unavailable");
                source_health.errors.insert("router".to_string(), e.to_string());
            }
        }

        if let Ok(raw) = self.primary.exec("radio info").await {
            match parsing::parse_radio_info(&raw, "primary") {
                Ok(mut r) => radios.append(&mut r),
                Err(e) => warn!(error = %e, "failed to parse primary radio info"),
            }
        }

        if let Ok(raw) = self.primary.exec("client list").await {
            match parsing::parse_client_list(&raw, "primary") {
                Ok(mut d) => devices.append(&mut d),
                Err(e) => warn!(error = %e, "failed to parse primary client list"),
            }
        }

        if let Ok(raw) = self.primary.exec("wan features").await {
            *enabled_wan_features = parsing::parse_enabled_wan_features(&raw);
        }

        // Peer discovery tolerates failure: a broken mesh membership
        // list still leaves the primary's own data usable.
        if let Err(e) = self.pool.initialize(&self.primary).await {
            warn!(error = %e, "peer discovery failed, continuing with primary only");
            source_health.errors.insert("mesh_peers".to_string(), e.to_string());
        }

        for peer in self.pool.nodes().await {
            if !peer.reachable {
                source_health
                    .errors
                    .insert(format!("peer:{}", peer.record.hw_address), "unreachable".to_string());
                continue;
            }
            let node_id = peer.record.hw_address.clone();
            if let Ok(raw) = self.pool.exec_on(&node_id, "system info").await {
                if let Ok(mut node) = parsing::parse_system_info(&raw, &node_id, false) {
                    node.backhaul = peer.record.backhaul();
                    nodes.push(node);
                }
            }
            if let Ok(raw) = self.pool.exec_on(&node_id, "radio info").await {
                if let Ok(mut r) = parsing::parse_radio_info(&raw, &node_id) {
                    radios.append(&mut r);
                }
            }
            if let Ok(raw) = self.pool.exec_on(&node_id, "client list").await {
                if let Ok(mut d) = parsing::parse_client_list(&raw, &node_id) {
                    devices.append(&mut d);
                }
            }
        }

        self.fan_in_cross_node_measurements(devices, Utc::now()).await;
    }

    /// For every known wireless device, ask each other reachable peer
    /// shell for that device's RSSI; duplicates within the dedup window
    /// are skipped (spec §4.8). This is what makes trilateration
    /// possible from a single scan.
    async fn fan_in_cross_node_measurements(&self, devices: &[Device], now: DateTime<Utc>) {
        let peers = self.pool.nodes().await;
        let reachable: Vec<String> = peers
            .iter()
            .filter(|p| p.reachable)
            .map(|p| p.record.hw_address.clone())
            .collect();
        if reachable.is_empty() {
            return;
        }

        let wireless: Vec<&Device> = devices
            .iter()
            .filter(|d| !matches!(d.link, meshsentinel_common::Link::Wired))
            .collect();

        for device in wireless {
            for node_id in &reachable {
                if *node_id == device.attached_node {
                    continue;
                }
                let key = (device.hw_address.clone(), node_id.clone());
                {
                    let mut last = self.last_cross_node.lock().await;
                    if let Some(seen_at) = last.get(&key) {
                        if now - *seen_at < CROSS_NODE_DEDUP_WINDOW {
                            continue;
                        }
                    }
                    last.insert(key.clone(), now);
                }

                let command = format!("rssi {}", device.hw_address);
                let reading = tokio::time::timeout(PEER_FAN_OUT_DEADLINE, self.pool.exec_on(node_id, &command)).await;
                let rssi = match reading {
                    Ok(Ok(raw)) => parsing::parse_rssi_reply(&raw),
                    _ => None,
                };
                if let Some(rssi) = rssi {
                    self.signal_store.append(SignalSample {
                        timestamp: now,
                        device_addr: device.hw_address.clone(),
                        node_addr: node_id.clone(),
                        rssi,
                        channel: None,
                        width_mhz: None,
                        rate_mbps: None,
                    });
                }
            }

            // The device's own attached-node reading came from `client
            // list`; record it too so the store has the full fan-in.
            if let Some(rssi) = device.last_rssi {
                let key = (device.hw_address.clone(), device.attached_node.clone());
                let mut last = self.last_cross_node.lock().await;
                let should_append = last
                    .get(&key)
                    .map(|seen_at| now - *seen_at >= CROSS_NODE_DEDUP_WINDOW)
                    .unwrap_or(true);
                if should_append {
                    last.insert(key, now);
                    drop(last);
                    self.signal_store.append(SignalSample {
                        timestamp: now,
                        device_addr: device.hw_address.clone(),
                        node_addr: device.attached_node.clone(),
                        rssi,
                        channel: None,
                        width_mhz: None,
                        rate_mbps: None,
                    });
                }
            }
        }
    }

    /// Run the neighbor scan command on each band the primary has a radio
    /// on, returning the per-band channel-occupancy scans so the caller
    /// can turn them into `ChannelRecommendation`s once the Zigbee channel
    /// (discovered in the following hub phase) is known.
    async fn scan_neighbors(
        &self,
        radios: &[Radio],
        source_health: &mut SourceHealth,
        neighbor_aps: &mut Vec<meshsentinel_common::NeighborAp>,
        current_channels: &mut HashMap<Band, u16>,
    ) -> HashMap<Band, Vec<ChannelScan>> {
        let mut scans_by_band = HashMap::new();
        let present_bands: Vec<Band> = SCANNED_BANDS
            .iter()
            .copied()
            .filter(|b| radios.iter().any(|r| r.band == *b))
            .collect();

        for band in present_bands {
            let command = match band {
                Band::Band24 => "neighbor scan 2.4ghz",
                Band::Band5 => "neighbor scan 5ghz",
                _ => continue,
            };
            let raw = match self.primary.exec(command).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, ?band, "neighbor scan unavailable");
                    source_health.errors.insert(format!("neighbor_scan:{band:?}"), e.to_string());
                    continue;
                }
            };
            let neighbors = SpectrumAnalyser::parse_neighbor_scan(&raw, band);
            let scans = SpectrumAnalyser::aggregate(&neighbors, band);
            if let Some(current_channel) = radios.iter().find(|r| r.band == band).map(|r| r.channel) {
                current_channels.insert(band, current_channel);
            }
            neighbor_aps.extend(neighbors);
            scans_by_band.insert(band, scans);
        }
        scans_by_band
    }

    async fn collect_hub(&self, source_health: &mut SourceHealth) -> Option<meshsentinel_common::ZigbeeNetwork> {
        let hub = self.hub.as_ref()?;
        let network = hub.get_zigbee_network().await;
        let devices = hub.get_zigbee_devices().await;
        match (network, devices) {
            (Ok(network), Ok(devices)) => match parsing::parse_zigbee_network(&network, &devices) {
                Ok(zn) => {
                    source_health.hub_available = true;
                    Some(zn)
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse zigbee network payload");
                    source_health.errors.insert("hub".to_string(), e.to_string());
                    None
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "hub unavailable");
                source_health.errors.insert("hub".to_string(), e.to_string());
                None
            }
        }
    }

    async fn collect_snmp(&self, source_health: &mut SourceHealth) -> Vec<SwitchWalkResult> {
        let Some(snmp) = self.snmp.as_ref() else {
            return Vec::new();
        };
        if self.config.snmp.devices.is_empty() {
            return Vec::new();
        }
        let results = snmp.walk_all(&self.config.snmp).await;
        let any_responded = results.iter().any(|r| r.status.is_some());
        source_health.snmp_available = any_responded;
        if !any_responded {
            source_health
                .errors
                .insert("snmp".to_string(), "no configured switch responded".to_string());
        }
        results
    }

    /// Estimate each wirelessly-backhauled peer's RSSI as seen by the
    /// primary, reusing the same `rssi <hw_address>` probe used for
    /// client devices (spec §4.9's wired-backhaul rule consumes this).
    async fn estimate_backhaul_rssi(&self, snapshot: &NetworkSnapshot) -> HashMap<String, i32> {
        let mut out = HashMap::new();
        for node in &snapshot.nodes {
            if node.is_primary || node.backhaul != Backhaul::Wireless {
                continue;
            }
            let command = format!("rssi {}", node.hw_address);
            if let Ok(raw) = self.primary.exec(&command).await {
                if let Some(rssi) = parsing::parse_rssi_reply(&raw) {
                    out.insert(node.id.clone(), rssi);
                }
            }
        }
        out
    }
}
