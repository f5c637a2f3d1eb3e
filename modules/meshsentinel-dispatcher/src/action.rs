use meshsentinel_alerts::ProblemSeverity;
use meshsentinel_common::{Band, NodePosition};
use meshsentinel_engine::OptimisationTarget;

/// `deviceList`'s filter parameter (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFilter {
    All,
    Wireless,
    Wired,
    Problematic,
}

/// The tagged-union request object the dispatcher routes (spec §6's
/// canonical action catalogue). `GetNodePositions` is the read side of
/// `SetNodePosition3D` implied by spec §8's round-trip property but not
/// itself named in the §6 list.
#[derive(Debug, Clone)]
pub enum Action {
    ScanNetwork { targets: Vec<OptimisationTarget> },
    NetworkHealth,
    DeviceList { filter: DeviceFilter },
    DeviceDetails { addr: String },
    DeviceSignalHistory { addr: String, hours: Option<u32> },
    MeshNodes,
    WifiSettings,
    SetWifiChannel { band: Band, channel: u16 },
    Problems { severity: Option<ProblemSeverity> },
    OptimizationSuggestions,
    ApplyOptimization { token: String, confirm: bool },
    ScanZigbee,
    FrequencyConflicts,
    TriangulateDevices { addr: Option<String> },
    SetNodePosition3D { position: NodePosition },
    GetNodePositions,
    RecordSignalMeasurement { device_addr: String, node_addr: String, rssi: i32 },
    DetectWalls { floor: Option<i32> },
    FullIntelligenceScan { targets: Vec<OptimisationTarget> },
    GetEnvironmentSummary,
    ConfigureAlerts { min_severity: ProblemSeverity, cooldown_secs: u64 },
    GetAlerts { hours: u32 },
    ResetCircuitBreaker { node_id: Option<String> },
    GetMetrics,
}

impl Action {
    /// Stable name recorded in the metrics sink and echoed in the
    /// `Response` envelope's `action` field.
    pub fn name(&self) -> &'static str {
        match self {
            Action::ScanNetwork { .. } => "scanNetwork",
            Action::NetworkHealth => "networkHealth",
            Action::DeviceList { .. } => "deviceList",
            Action::DeviceDetails { .. } => "deviceDetails",
            Action::DeviceSignalHistory { .. } => "deviceSignalHistory",
            Action::MeshNodes => "meshNodes",
            Action::WifiSettings => "wifiSettings",
            Action::SetWifiChannel { .. } => "setWifiChannel",
            Action::Problems { .. } => "problems",
            Action::OptimizationSuggestions => "optimizationSuggestions",
            Action::ApplyOptimization { .. } => "applyOptimization",
            Action::ScanZigbee => "scanZigbee",
            Action::FrequencyConflicts => "frequencyConflicts",
            Action::TriangulateDevices { .. } => "triangulateDevices",
            Action::SetNodePosition3D { .. } => "setNodePosition3D",
            Action::GetNodePositions => "getNodePositions",
            Action::RecordSignalMeasurement { .. } => "recordSignalMeasurement",
            Action::DetectWalls { .. } => "detectWalls",
            Action::FullIntelligenceScan { .. } => "fullIntelligenceScan",
            Action::GetEnvironmentSummary => "getEnvironmentSummary",
            Action::ConfigureAlerts { .. } => "configureAlerts",
            Action::GetAlerts { .. } => "getAlerts",
            Action::ResetCircuitBreaker { .. } => "resetCircuitBreaker",
            Action::GetMetrics => "getMetrics",
        }
    }

    /// Whether this action needs a fresh scan rather than reusing the
    /// cached snapshot (spec §4.10: "handlers are stateless over the
    /// snapshot ... unless the action requires a fresh scan").
    pub fn requires_fresh_scan(&self) -> bool {
        matches!(self, Action::ScanNetwork { .. } | Action::FullIntelligenceScan { .. })
    }
}
