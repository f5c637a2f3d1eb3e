use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::types::Problem;

/// Pluggable outbound channel for routed alerts (spec §6: "HTTP POST of
/// an alert object to a configured webhook URL; optional publish to a
/// message-broker topic").
#[async_trait]
pub trait AlertBackend: Send + Sync {
    async fn send(&self, problem: &Problem) -> anyhow::Result<()>;
}

pub struct WebhookBackend {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertBackend for WebhookBackend {
    async fn send(&self, problem: &Problem) -> anyhow::Result<()> {
        let payload = json!({
            "key": problem.key,
            "severity": problem.severity,
            "summary": problem.summary,
            "detail": problem.detail,
            "detected_at": problem.detected_at,
        });

        let resp = self.http.post(&self.webhook_url).json(&payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "alert webhook returned non-success");
            anyhow::bail!("alert webhook returned {status}");
        }
        Ok(())
    }
}

/// A broker publish backend: `topic` names the message-broker topic this
/// instance publishes to; the actual transport is left to whichever
/// broker client `meshsentinel-server` wires in, so this crate only
/// needs the trait boundary, not a concrete broker dependency.
pub struct BrokerBackend<P: BrokerPublisher> {
    topic: String,
    publisher: P,
}

#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

impl<P: BrokerPublisher> BrokerBackend<P> {
    pub fn new(topic: impl Into<String>, publisher: P) -> Self {
        Self {
            topic: topic.into(),
            publisher,
        }
    }
}

#[async_trait]
impl<P: BrokerPublisher> AlertBackend for BrokerBackend<P> {
    async fn send(&self, problem: &Problem) -> anyhow::Result<()> {
        let payload = json!({
            "key": problem.key,
            "severity": problem.severity,
            "summary": problem.summary,
            "detail": problem.detail,
            "detected_at": problem.detected_at,
        });
        self.publisher.publish(&self.topic, payload).await
    }
}
