use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meshsentinel_alerts::{AlertBackend, AlertRouter, AlertThreshold, ProblemSeverity, WebhookBackend};
use meshsentinel_common::config::AlertMinSeverity;
use meshsentinel_common::Config;
use meshsentinel_core::{InMemoryMetrics, MetricsSink};
use meshsentinel_dispatcher::{Action, ActionDispatcher};
use meshsentinel_knowledge::KnowledgeBase;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(config.logging.level.as_level_filter().into())
                .parse_lossy(""),
        )
        .init();

    info!("meshsentinel starting");

    let data_dir = PathBuf::from(&config.server.data_dir);
    if let Err(e) = tokio::fs::create_dir_all(&data_dir).await {
        warn!(error = %e, dir = %data_dir.display(), "failed to create data directory");
    }
    let knowledge_path = data_dir.join("network-knowledge.json");
    let knowledge = Arc::new(KnowledgeBase::load_or_create(&knowledge_path, &config.server.network_id).await);
    let auto_flush = knowledge.spawn_auto_flush();

    let alert_router = Arc::new(build_alert_router(&config));
    let metrics: Arc<dyn MetricsSink> = Arc::new(InMemoryMetrics::new());

    let dispatcher = Arc::new(ActionDispatcher::new(config.clone(), knowledge.clone(), alert_router, metrics));
    if let Err(e) = dispatcher.initialize().await {
        tracing::error!(error = %e, "failed to connect to the primary device, exiting");
        std::process::exit(1);
    }
    info!("meshsentinel ready, scanning every {}ms", config.scan.interval_ms);

    run(dispatcher.clone(), knowledge.clone(), &config).await;

    dispatcher.shutdown().await;
    auto_flush.abort();
    info!("meshsentinel stopped");
    Ok(())
}

/// `Config::from_file(DEFAULT_CONFIG_PATH)` if present, else a positional
/// path argument, else baked-in defaults. No environment-variable or
/// flag-parsing layer — reading `std::env` for configuration is
/// explicitly out of scope.
fn load_config() -> Config {
    if let Some(path) = std::env::args().nth(1) {
        return Config::from_file(&path).unwrap_or_else(|e| {
            eprintln!("failed to read config {path}: {e}, falling back to defaults");
            Config::default()
        });
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return Config::from_file(DEFAULT_CONFIG_PATH).unwrap_or_else(|e| {
            eprintln!("failed to read {DEFAULT_CONFIG_PATH}: {e}, falling back to defaults");
            Config::default()
        });
    }
    Config::default()
}

fn build_alert_router(config: &Config) -> AlertRouter {
    let min_severity = match config.alerts.min_severity {
        AlertMinSeverity::Info => ProblemSeverity::Info,
        AlertMinSeverity::Warning => ProblemSeverity::Warning,
        AlertMinSeverity::Critical => ProblemSeverity::Critical,
    };
    let threshold = AlertThreshold { min_severity, cooldown_secs: config.alerts.cooldown_secs };

    let mut backends: Vec<Box<dyn AlertBackend>> = Vec::new();
    if !config.alerts.webhook_url.is_empty() {
        backends.push(Box::new(WebhookBackend::new(config.alerts.webhook_url.clone())));
    }
    AlertRouter::new(threshold, backends)
}

/// Drive the periodic scan timer and the three process signals spec §5
/// names: SIGINT/SIGTERM drain and stop the loop, SIGHUP reloads the
/// knowledge base in place without disturbing live transports.
async fn run(dispatcher: Arc<ActionDispatcher>, knowledge: Arc<KnowledgeBase>, config: &Config) {
    let mut scan_interval = tokio::time::interval(Duration::from_millis(config.scan.interval_ms));
    scan_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate()).expect("installing SIGTERM handler"),
            signal(SignalKind::hangup()).expect("installing SIGHUP handler"),
        )
    };

    loop {
        #[cfg(unix)]
        tokio::select! {
            _ = scan_interval.tick() => run_scan(&dispatcher).await,
            _ = tokio::signal::ctrl_c() => { info!("SIGINT received, shutting down"); break; }
            _ = sigterm.recv() => { info!("SIGTERM received, shutting down"); break; }
            _ = sighup.recv() => reload_knowledge(&knowledge).await,
        }

        #[cfg(not(unix))]
        tokio::select! {
            _ = scan_interval.tick() => run_scan(&dispatcher).await,
            _ = tokio::signal::ctrl_c() => { info!("ctrl-c received, shutting down"); break; }
        }
    }
}

async fn run_scan(dispatcher: &Arc<ActionDispatcher>) {
    let response = dispatcher.execute(Action::FullIntelligenceScan { targets: Vec::new() }).await;
    if !response.success {
        warn!(error = ?response.error, "periodic scan failed");
    }
}

async fn reload_knowledge(knowledge: &Arc<KnowledgeBase>) {
    if let Err(e) = knowledge.reload().await {
        warn!(error = %e, "knowledge base reload failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_is_relative() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config.json");
    }
}
