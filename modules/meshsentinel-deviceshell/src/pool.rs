use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use meshsentinel_common::{Backhaul, MeshError, MeshResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::shell::DeviceShell;
use crate::transport::{ShellCredentials, ShellTransport};

/// One entry from the primary device's cluster-membership list.
///
/// The membership record is an opaque angle-bracket delimited line per
/// peer (spec §4.2); MeshSentinel doesn't own its bit-layout, only the
/// shape `<hw=...|ip=...|cost=...|model=...|alias=...>`. `cost == 0`
/// means wired backhaul, `cost > 0` means wireless — the canonical
/// reading the spec asserts (see DESIGN.md Open Question decisions).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRecord {
    pub hw_address: String,
    pub ip: String,
    pub cost: u32,
    pub model: String,
    pub alias: String,
}

impl PeerRecord {
    pub fn backhaul(&self) -> Backhaul {
        if self.cost == 0 {
            Backhaul::Wired
        } else {
            Backhaul::Wireless
        }
    }
}

/// Parse the cluster-membership record. Malformed entries are skipped
/// (logged as a `ParseError` with a truncated sample) rather than
/// aborting discovery of the remaining peers.
pub fn parse_membership(raw: &str) -> Vec<PeerRecord> {
    let mut records = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_entry(line) {
            Some(record) => records.push(record),
            None => {
                let err = MeshError::parse(line);
                warn!(%err, "skipping malformed membership entry");
            }
        }
    }
    records
}

fn parse_entry(line: &str) -> Option<PeerRecord> {
    let inner = line.strip_prefix('<')?.strip_suffix('>')?;
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for part in inner.split('|') {
        let (k, v) = part.split_once('=')?;
        fields.insert(k.trim(), v.trim());
    }
    Some(PeerRecord {
        hw_address: meshsentinel_common::canonical_hw_address(fields.get("hw")?),
        ip: (*fields.get("ip")?).to_string(),
        cost: fields.get("cost")?.parse().ok()?,
        model: fields.get("model").copied().unwrap_or("").to_string(),
        alias: fields.get("alias").copied().unwrap_or("").to_string(),
    })
}

/// Reachability snapshot for one discovered peer node.
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub record: PeerRecord,
    pub reachable: bool,
}

struct Peer<T: ShellTransport> {
    record: PeerRecord,
    shell: Option<Arc<DeviceShell<T>>>,
}

/// Discovers peer mesh nodes from the primary `DeviceShell` and opens one
/// `DeviceShell` per reachable peer, fanning commands out across all of
/// them (spec §4.2).
pub struct NodePool<T: ShellTransport> {
    peers: tokio::sync::RwLock<HashMap<String, Peer<T>>>,
    ssh_port: u16,
    ssh_user: String,
    ssh_password: Option<String>,
    ssh_key_path: Option<String>,
}

impl<T: ShellTransport + 'static> NodePool<T> {
    pub fn new(ssh_port: u16, ssh_user: String, ssh_password: Option<String>, ssh_key_path: Option<String>) -> Self {
        Self {
            peers: tokio::sync::RwLock::new(HashMap::new()),
            ssh_port,
            ssh_user,
            ssh_password,
            ssh_key_path,
        }
    }

    /// Parse the primary shell's membership list and open one shell per
    /// peer concurrently. Individual connect failures are tolerated — the
    /// peer is retained, marked unreachable.
    pub async fn initialize(&self, primary_shell: &DeviceShell<T>) -> MeshResult<()> {
        let raw = primary_shell.exec("mesh peers").await?;
        let records = parse_membership(&raw);

        let mut connected = HashMap::new();
        let mut handles = Vec::new();
        for record in records {
            let creds = ShellCredentials {
                host: record.ip.clone(),
                port: self.ssh_port,
                user: self.ssh_user.clone(),
                password: self.ssh_password.clone(),
                key_path: self.ssh_key_path.clone(),
            };
            handles.push(async move {
                let shell: DeviceShell<T> = DeviceShell::new(creds);
                let result = shell.connect().await;
                (record, shell, result)
            });
        }

        for (record, shell, result) in futures::future::join_all(handles).await {
            let reachable = result.is_ok();
            if let Err(e) = &result {
                warn!(peer = %record.hw_address, error = %e, "peer unreachable at discovery");
            }
            connected.insert(
                record.hw_address.clone(),
                Peer {
                    record,
                    shell: if reachable { Some(Arc::new(shell)) } else { None },
                },
            );
        }

        info!(peers = connected.len(), "node pool initialized");
        *self.peers.write().await = connected;
        Ok(())
    }

    /// Run a command on one named peer.
    pub async fn exec_on(&self, node_id: &str, command: &str) -> MeshResult<String> {
        let peers = self.peers.read().await;
        let peer = peers
            .get(node_id)
            .ok_or_else(|| MeshError::UnknownNode(node_id.to_string()))?;
        let shell = peer
            .shell
            .clone()
            .ok_or_else(|| MeshError::Unavailable(format!("{node_id} unreachable")))?;
        drop(peers);
        shell.exec(command).await
    }

    /// Run a command across every reachable peer concurrently, sharing
    /// one overall deadline.
    pub async fn exec_on_all(
        &self,
        command: &str,
        deadline: Duration,
    ) -> HashMap<String, MeshResult<String>> {
        let peers = self.peers.read().await;
        let targets: Vec<(String, Arc<DeviceShell<T>>)> = peers
            .iter()
            .filter_map(|(id, peer)| peer.shell.clone().map(|s| (id.clone(), s)))
            .collect();
        drop(peers);

        let futs = targets.into_iter().map(|(id, shell)| {
            let command = command.to_string();
            async move {
                let result = tokio::time::timeout(deadline, shell.exec(&command))
                    .await
                    .unwrap_or(Err(MeshError::Timeout(deadline)));
                (id, result)
            }
        });

        futures::future::join_all(futs).await.into_iter().collect()
    }

    pub async fn nodes(&self) -> Vec<PeerStatus> {
        self.peers
            .read()
            .await
            .values()
            .map(|p| PeerStatus {
                record: p.record.clone(),
                reachable: p.shell.is_some(),
            })
            .collect()
    }

    /// Force one peer's circuit breaker closed (spec §4.10's
    /// `resetCircuitBreaker` action, scoped to a single node).
    pub async fn reset_circuit(&self, node_id: &str) -> MeshResult<()> {
        let peers = self.peers.read().await;
        let peer = peers
            .get(node_id)
            .ok_or_else(|| MeshError::UnknownNode(node_id.to_string()))?;
        match &peer.shell {
            Some(shell) => {
                shell.reset_circuit();
                Ok(())
            }
            None => Err(MeshError::Unavailable(format!("{node_id} unreachable"))),
        }
    }

    /// Force every reachable peer's circuit breaker closed.
    pub async fn reset_all_circuits(&self) {
        for peer in self.peers.read().await.values() {
            if let Some(shell) = &peer.shell {
                shell.reset_circuit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wired_and_wireless_peers() {
        let raw = "<hw=AA:BB:CC:DD:EE:FF|ip=192.168.1.2|cost=0|model=X5|alias=living-room>\n\
                   <hw=11:22:33:44:55:66|ip=192.168.1.3|cost=5|model=X5|alias=garage>";
        let peers = parse_membership(raw);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].backhaul(), Backhaul::Wired);
        assert_eq!(peers[1].backhaul(), Backhaul::Wireless);
        assert_eq!(peers[0].hw_address, "aa:bb:cc:dd:ee:ff");
        assert_eq!(peers[0].alias, "living-room");
    }

    #[test]
    fn skips_malformed_entries_without_aborting() {
        let raw = "<hw=AA:BB:CC:DD:EE:FF|ip=192.168.1.2|cost=0|model=X5|alias=a>\n\
                   garbage line\n\
                   <hw=11:22:33:44:55:66|ip=192.168.1.3|cost=1|model=X5|alias=b>";
        let peers = parse_membership(raw);
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn missing_required_field_is_skipped() {
        let raw = "<hw=AA:BB:CC:DD:EE:FF|cost=0|model=X5|alias=a>"; // no ip
        assert!(parse_membership(raw).is_empty());
    }
}
