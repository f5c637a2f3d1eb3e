use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meshsentinel_common::NetworkSnapshot;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::document::{ConnectionEvent, KnowledgeDocument, OptimisationRecord};

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Durable store for device profiles, snapshots and optimisation history
/// (spec §6). Holds an internal dirty flag; every public mutator sets it
/// and returns synchronously, while a background task flushes to disk
/// every 30s when dirty, mirroring the "writer loop + dirty flag"
/// discipline the spec calls out in §5.
pub struct KnowledgeBase {
    path: PathBuf,
    document: Arc<RwLock<KnowledgeDocument>>,
    dirty: Arc<AtomicBool>,
}

impl KnowledgeBase {
    /// Load an existing document from `path`, or start a fresh one for
    /// `network_id` if none exists yet.
    pub async fn load_or_create(path: impl AsRef<Path>, network_id: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt knowledge document, starting fresh");
                    KnowledgeDocument::new(network_id)
                }
            },
            Err(_) => KnowledgeDocument::new(network_id),
        };

        Self {
            path,
            document: Arc::new(RwLock::new(document)),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the 30s auto-flush loop. Returns a handle the caller can
    /// abort on shutdown (after a final explicit `flush`).
    pub fn spawn_auto_flush(&self) -> tokio::task::JoinHandle<()> {
        let path = self.path.clone();
        let document = self.document.clone();
        let dirty = self.dirty.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                interval.tick().await;
                if dirty.swap(false, Ordering::AcqRel) {
                    if let Err(e) = flush_to_disk(&path, &document).await {
                        error!(error = %e, "knowledge base auto-flush failed");
                        dirty.store(true, Ordering::Release);
                    } else {
                        debug!(path = %path.display(), "knowledge base flushed");
                    }
                }
            }
        })
    }

    pub async fn record_snapshot(&self, snapshot: NetworkSnapshot) {
        self.document.write().await.push_snapshot(snapshot);
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn record_connection_event(&self, event: ConnectionEvent) {
        self.document.write().await.push_connection_event(event);
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn record_optimisation(&self, record: OptimisationRecord) {
        self.document.write().await.record_optimisation(record);
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn touch_device(&self, hw_address: &str, hostname: Option<String>, vendor: Option<String>) {
        self.document
            .write()
            .await
            .touch_device(hw_address, hostname, vendor);
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn snapshot_count(&self) -> usize {
        self.document.read().await.snapshots.len()
    }

    pub async fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Force an immediate write regardless of the dirty flag, used on
    /// shutdown and by `reload`'s caller before swapping documents.
    pub async fn flush(&self) -> std::io::Result<()> {
        flush_to_disk(&self.path, &self.document).await?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Reload the document from disk without disturbing live transports
    /// (the SIGHUP path, spec §5).
    pub async fn reload(&self) -> std::io::Result<()> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let reloaded: KnowledgeDocument = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        *self.document.write().await = reloaded;
        self.dirty.store(false, Ordering::Release);
        info!(path = %self.path.display(), "knowledge base reloaded");
        Ok(())
    }
}

async fn flush_to_disk(path: &Path, document: &RwLock<KnowledgeDocument>) -> std::io::Result<()> {
    let mut guard = document.write().await;
    guard.updated_at = Utc::now();
    let json = serde_json::to_string_pretty(&*guard)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    drop(guard);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await
}
