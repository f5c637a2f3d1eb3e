use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use csnmp::{ObjectIdentifier, Snmp2cClient};
use futures::future::join_all;
use meshsentinel_common::config::SnmpConfig;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::types::{SwitchPort, SwitchStatus, SwitchWalkResult, VlanEntry};

const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
const IF_OPER_STATUS: &str = "1.3.6.1.2.1.2.2.1.8";
const DOT1Q_VLAN_STATIC_NAME: &str = "1.3.6.1.2.1.17.7.1.4.3.1.1";
const PETH_PSE_PORT_POWER: &str = "1.3.6.1.2.1.105.1.1.1.7";

const MAX_CONCURRENT_WALKS: usize = 4;
const PER_HOST_DEADLINE: Duration = Duration::from_secs(10);

/// Bulk-walks a set of SNMP-managed switches concurrently, bounded by a
/// semaphore so a flaky switch can't starve the others (spec §4.4).
pub struct SnmpClient {
    semaphore: Arc<Semaphore>,
}

impl Default for SnmpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SnmpClient {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_WALKS)),
        }
    }

    pub async fn walk_all(&self, config: &SnmpConfig) -> Vec<SwitchWalkResult> {
        let tasks = config.devices.iter().map(|device| {
            let semaphore = self.semaphore.clone();
            let device = device.clone();
            async move {
                let _permit = semaphore.acquire().await;
                let status = walk_host(&device.host, device.port, &device.community).await;
                SwitchWalkResult {
                    host: device.host.clone(),
                    status,
                }
            }
        });
        join_all(tasks).await
    }

    pub async fn walk_one(&self, host: &str, port: u16, community: &str) -> SwitchWalkResult {
        let _permit = self.semaphore.acquire().await;
        SwitchWalkResult {
            host: host.to_string(),
            status: walk_host(host, port, community).await,
        }
    }
}

async fn walk_host(host: &str, port: u16, community: &str) -> Option<SwitchStatus> {
    let target = format!("{host}:{port}");
    let socket_addr = match target.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(host, error = %e, "unparseable snmp target address");
            return None;
        }
    };

    let client = match tokio::time::timeout(
        PER_HOST_DEADLINE,
        Snmp2cClient::new(socket_addr, community.as_bytes().to_vec(), None, 0),
    )
    .await
    {
        Ok(Ok(client)) => client,
        _ => {
            warn!(host, "snmp host did not respond within deadline");
            return None;
        }
    };

    let descrs = walk_bulk(&client, IF_DESCR).await.unwrap_or_default();
    let statuses = walk_bulk(&client, IF_OPER_STATUS).await.unwrap_or_default();
    let vlans = walk_bulk(&client, DOT1Q_VLAN_STATIC_NAME)
        .await
        .unwrap_or_default();
    let poe = walk_bulk(&client, PETH_PSE_PORT_POWER)
        .await
        .unwrap_or_default();

    let ports = descrs
        .into_iter()
        .map(|(oid, description)| {
            let index = last_oid_component(&oid);
            let up = statuses
                .iter()
                .find(|(s_oid, _)| last_oid_component(s_oid) == index)
                .map(|(_, value)| value == "1")
                .unwrap_or(false);
            let vlan = vlans
                .iter()
                .find(|(v_oid, _)| last_oid_component(v_oid) == index)
                .and_then(|(v_oid, _)| Some(last_oid_component(v_oid)));
            let poe_watts = poe
                .iter()
                .find(|(p_oid, _)| last_oid_component(p_oid) == index)
                .and_then(|(_, value)| value.parse::<f64>().ok())
                .map(|milliwatts| milliwatts / 1000.0);
            SwitchPort {
                index,
                description,
                up,
                vlan,
                poe_watts,
            }
        })
        .collect();

    let vlan_entries = vlans
        .into_iter()
        .map(|(oid, name)| VlanEntry {
            id: last_oid_component(&oid),
            name,
        })
        .collect();

    Some(SwitchStatus {
        host: host.to_string(),
        ports,
        vlans: vlan_entries,
    })
}

/// Walk one OID subtree. Unknown OIDs (devices that don't implement the
/// branch) yield an empty vector rather than an error, per spec §4.4.
async fn walk_bulk(client: &Snmp2cClient, base_oid: &str) -> Option<Vec<(ObjectIdentifier, String)>> {
    let oid = ObjectIdentifier::from_str(base_oid).ok()?;
    match tokio::time::timeout(PER_HOST_DEADLINE, client.walk_bulk(oid)).await {
        Ok(Ok(entries)) => Some(
            entries
                .into_iter()
                .map(|(oid, value)| (oid, format!("{value}")))
                .collect(),
        ),
        Ok(Err(e)) => {
            warn!(base_oid, error = %e, "snmp walk error, returning empty result");
            Some(Vec::new())
        }
        Err(_) => None,
    }
}

fn last_oid_component(oid: &ObjectIdentifier) -> u32 {
    oid.as_slice().last().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_component_extracts_table_index() {
        let oid = ObjectIdentifier::from_str("1.3.6.1.2.1.2.2.1.2.7").unwrap();
        assert_eq!(last_oid_component(&oid), 7);
    }
}
