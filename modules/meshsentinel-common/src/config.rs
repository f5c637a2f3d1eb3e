use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MeshError, MeshResult};

/// Top-level configuration (spec §6). Every field has a default so a
/// partial on-disk document still produces a fully populated `Config`.
///
/// Loading is file-based, not environment-variable-based: parsing
/// `std::env` for configuration is explicitly out of scope (spec §1), so
/// the only entry points are `Config::default()` and `Config::from_file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfig,
    pub hub: HubConfig,
    pub zigbee: ZigbeeConfig,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
    pub snmp: SnmpConfig,
    pub triangulation: TriangulationConfig,
    pub server: ServerConfig,
    pub alerts: AlertsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            hub: HubConfig::default(),
            zigbee: ZigbeeConfig::default(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
            snmp: SnmpConfig::default(),
            triangulation: TriangulationConfig::default(),
            server: ServerConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

/// Where the process keeps its durable state and what it calls this
/// network (spec §6's `${dataDir}/network-knowledge.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub data_dir: String,
    pub network_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            network_id: "default".to_string(),
        }
    }
}

/// Severity floor for outbound alert routing. Mirrored (not shared) by
/// `meshsentinel-alerts::ProblemSeverity`: this crate has no dependency
/// on that one, so `meshsentinel-dispatcher` converts between the two at
/// startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMinSeverity {
    Info,
    Warning,
    Critical,
}

/// Outbound alert routing (spec §6: "HTTP POST ... to a configured
/// webhook URL; optional publish to a message-broker topic"). An empty
/// `webhook_url` means no `WebhookBackend` is wired in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub webhook_url: String,
    pub broker_topic: String,
    pub min_severity: AlertMinSeverity,
    pub cooldown_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            broker_topic: String::new(),
            min_severity: AlertMinSeverity::Warning,
            cooldown_secs: 900,
        }
    }
}

impl Config {
    /// Read a JSON configuration document from disk, filling in defaults
    /// for any field the document omits.
    pub fn from_file(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MeshError::Invariant(format!("reading config {path:?}: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| MeshError::Invariant(format!("parsing config {path:?}: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub ssh_password: Option<String>,
    pub ssh_key_path: Option<String>,
    pub http_port: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            ssh_port: 22,
            ssh_user: "admin".to_string(),
            ssh_password: None,
            ssh_key_path: None,
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub access_token: String,
    pub use_ssl: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8123,
            access_token: String::new(),
            use_ssl: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorType {
    Native,
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZigbeeConfig {
    pub coordinator_type: CoordinatorType,
    pub preferred_channel: u8,
}

impl Default for ZigbeeConfig {
    fn default() -> Self {
        Self {
            coordinator_type: CoordinatorType::Native,
            preferred_channel: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_ms: u64,
    pub signal_history_retention_days: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            signal_history_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Map onto `tracing`'s `LevelFilter`. `Fatal` has no tracing
    /// equivalent; it is treated as `Error`, the closest filter that
    /// still surfaces unrecoverable conditions.
    pub fn as_level_filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnmpDeviceType {
    Generic,
    Mikrotik,
    Cisco,
    Ubiquiti,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpDevice {
    pub host: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default)]
    pub device_type: SnmpDeviceType,
}

impl Default for SnmpDeviceType {
    fn default() -> Self {
        SnmpDeviceType::Generic
    }
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub devices: Vec<SnmpDevice>,
}

/// Tunables for the triangulation path-loss model. Two inconsistent
/// hard-coded readings existed upstream (spec §9 open question); this
/// makes the pair one deployment-level tunable instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    pub path_loss_exponent: f64,
    pub reference_rssi_dbm: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            path_loss_exponent: 3.5,
            reference_rssi_dbm: -40.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.router.ssh_port, 22);
        assert_eq!(cfg.router.ssh_user, "admin");
        assert_eq!(cfg.router.http_port, 80);
        assert_eq!(cfg.hub.port, 8123);
        assert!(!cfg.hub.use_ssl);
        assert_eq!(cfg.zigbee.preferred_channel, 15);
        assert_eq!(cfg.scan.interval_ms, 30_000);
        assert_eq!(cfg.scan.signal_history_retention_days, 7);
        assert_eq!(cfg.logging.level, LogLevel::Info);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let partial = r#"{ "router": { "host": "192.168.1.1" } }"#;
        let cfg: Config = serde_json::from_str(partial).unwrap();
        assert_eq!(cfg.router.host, "192.168.1.1");
        assert_eq!(cfg.router.ssh_port, 22);
        assert_eq!(cfg.hub.port, 8123);
    }

    #[test]
    fn round_trips_through_serialize() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scan.interval_ms, cfg.scan.interval_ms);
    }
}
