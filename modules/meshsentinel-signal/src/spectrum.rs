use std::collections::HashMap;

use chrono::Utc;
use meshsentinel_common::{Band, ChannelPlan, MeshError, MeshResult, NeighborAp};
use serde::Serialize;

const INTERFERENCE_RSSI_STRONG: i32 = -60;
const INTERFERENCE_RSSI_MODERATE: i32 = -70;
const ZIGBEE_OVERLAP_WINDOW_MHZ: f64 = 22.0;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelScan {
    pub channel: u16,
    pub band: Band,
    pub networks_on_channel: u32,
    pub utilisation: f64,
    pub neighbors: Vec<NeighborAp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecommendation {
    pub band: Band,
    pub current_channel: u16,
    pub best_channel: u16,
    pub best_score: f64,
    pub current_score: f64,
    pub improvement: f64,
}

pub struct SpectrumAnalyser;

impl SpectrumAnalyser {
    /// Parse neighbor scan output into `NeighborAp`s. Two incompatible
    /// upstream formats exist (spec §9 open question); this sniffs the
    /// first non-empty line and dispatches accordingly so both converge
    /// on one `NeighborAp` shape.
    pub fn parse_neighbor_scan(raw: &str, band: Band) -> Vec<NeighborAp> {
        let first_line = raw.lines().find(|l| !l.trim().is_empty());
        match first_line {
            Some(line) if line.contains("SSID:") => parse_block_format(raw, band),
            Some(_) => parse_kv_format(raw, band),
            None => Vec::new(),
        }
    }

    /// Aggregate neighbors per channel on one band into `ChannelScan`s.
    pub fn aggregate(neighbors: &[NeighborAp], band: Band) -> Vec<ChannelScan> {
        let mut by_channel: HashMap<u16, Vec<NeighborAp>> = HashMap::new();
        for n in neighbors.iter().filter(|n| n.band == band) {
            by_channel.entry(n.channel).or_default().push(n.clone());
        }
        by_channel
            .into_iter()
            .map(|(channel, group)| {
                let count = group.len() as u32;
                ChannelScan {
                    channel,
                    band,
                    networks_on_channel: count,
                    utilisation: (15.0 * count as f64).min(100.0),
                    neighbors: group,
                }
            })
            .collect()
    }

    /// Score every valid channel on `band`, pick the best, and compare
    /// against `current_channel`. `zigbee_channel` is `None` when no
    /// Zigbee coordinator is present.
    pub fn recommend_channel(
        scans: &[ChannelScan],
        band: Band,
        current_channel: u16,
        zigbee_channel: Option<u8>,
    ) -> MeshResult<ChannelRecommendation> {
        if !ChannelPlan::is_valid(band, current_channel) {
            return Err(MeshError::Invariant(format!(
                "channel {current_channel} is not valid for {band:?}"
            )));
        }

        let scored: Vec<(u16, f64)> = ChannelPlan::valid_channels(band)
            .iter()
            .map(|&c| (c, score_channel(scans, band, c, zigbee_channel)))
            .collect();

        let (best_channel, best_score) = scored
            .iter()
            .copied()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .ok_or_else(|| MeshError::Invariant(format!("no valid channels for {band:?}")))?;

        let current_score = scored
            .iter()
            .find(|(c, _)| *c == current_channel)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);

        Ok(ChannelRecommendation {
            band,
            current_channel,
            best_channel,
            best_score,
            current_score,
            improvement: best_score - current_score,
        })
    }
}

fn score_channel(scans: &[ChannelScan], band: Band, channel: u16, zigbee_channel: Option<u8>) -> f64 {
    let scan = scans.iter().find(|s| s.channel == channel);
    let utilisation = scan.map(|s| s.utilisation).unwrap_or(0.0);
    let neighbors = scan.map(|s| s.neighbors.as_slice()).unwrap_or(&[]);
    let interfering_count = neighbors.len() as f64;

    let mut score = 100.0;
    score -= utilisation * 0.5;
    score -= 5.0 * interfering_count;

    for n in neighbors {
        if n.rssi > INTERFERENCE_RSSI_STRONG {
            score -= 10.0;
        } else if n.rssi > INTERFERENCE_RSSI_MODERATE {
            score -= 5.0;
        }
    }

    if band == Band::Band24 {
        if let Some(zigbee) = zigbee_channel {
            score -= 30.0 * overlap_with_zigbee(channel, zigbee);
        }
        if ChannelPlan::NON_OVERLAPPING_24.contains(&channel) {
            score += 5.0;
        }
    }

    score.max(0.0)
}

/// `overlap = max(0, 1 - |freq(c) - freq(zigbee)| / 22 MHz)` (spec §4.7).
pub fn overlap_with_zigbee(wifi_channel: u16, zigbee_channel: u8) -> f64 {
    let wifi_freq = Band::Band24.centre_freq_mhz(wifi_channel);
    let zigbee_freq = 2405.0 + 5.0 * (zigbee_channel as f64 - 11.0);
    (1.0 - (wifi_freq - zigbee_freq).abs() / ZIGBEE_OVERLAP_WINDOW_MHZ).max(0.0)
}

fn parse_block_format(raw: &str, band: Band) -> Vec<NeighborAp> {
    let mut neighbors = Vec::new();
    let mut ssid = String::new();
    let mut bssid = String::new();
    let mut channel: u16 = 0;
    let mut rssi: i32 = 0;
    let mut in_block = false;

    let flush = |ssid: &str, bssid: &str, channel: u16, rssi: i32, out: &mut Vec<NeighborAp>| {
        if channel > 0 && !bssid.is_empty() {
            out.push(NeighborAp {
                ssid: ssid.to_string(),
                bssid: bssid.to_string(),
                channel,
                band,
                rssi,
                last_seen: Utc::now(),
            });
        }
    };

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("SSID:") {
            if in_block {
                flush(&ssid, &bssid, channel, rssi, &mut neighbors);
            }
            ssid = rest.trim().to_string();
            bssid.clear();
            channel = 0;
            rssi = 0;
            in_block = true;
        } else if let Some(rest) = trimmed.strip_prefix("BSSID:") {
            bssid = rest.trim().to_lowercase();
        } else if let Some(rest) = trimmed.strip_prefix("Channel:") {
            channel = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = trimmed.strip_prefix("RSSI:") {
            rssi = rest.trim().parse().unwrap_or(0);
        }
    }
    if in_block {
        flush(&ssid, &bssid, channel, rssi, &mut neighbors);
    }
    neighbors
}

fn parse_kv_format(raw: &str, band: Band) -> Vec<NeighborAp> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let fields: HashMap<&str, &str> = line
                .split_whitespace()
                .filter_map(|tok| tok.split_once('='))
                .collect();
            let bssid = fields.get("bssid").unwrap_or(&"").to_lowercase();
            let channel: u16 = fields.get("channel").and_then(|c| c.parse().ok()).unwrap_or(0);
            if channel == 0 || bssid.is_empty() {
                return None;
            }
            Some(NeighborAp {
                ssid: fields.get("ssid").unwrap_or(&"").to_string(),
                bssid,
                channel,
                band,
                rssi: fields.get("rssi").and_then(|r| r.parse().ok()).unwrap_or(0),
                last_seen: Utc::now(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SAMPLE: &str = "SSID: Neighbor1\nBSSID: AA:BB:CC:DD:EE:01\nChannel: 6\nRSSI: -65\nSSID: Neighbor2\nBSSID: AA:BB:CC:DD:EE:02\nChannel: 11\nRSSI: -72\n";

    const KV_SAMPLE: &str = "ssid=Neighbor1 bssid=aa:bb:cc:dd:ee:01 channel=6 rssi=-65\nssid=Neighbor2 bssid=aa:bb:cc:dd:ee:02 channel=11 rssi=-72\n";

    #[test]
    fn parses_block_format() {
        let neighbors = SpectrumAnalyser::parse_neighbor_scan(BLOCK_SAMPLE, Band::Band24);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].channel, 6);
    }

    #[test]
    fn parses_kv_format() {
        let neighbors = SpectrumAnalyser::parse_neighbor_scan(KV_SAMPLE, Band::Band24);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[1].channel, 11);
    }

    #[test]
    fn rejects_blocks_missing_channel_or_bssid() {
        let raw = "SSID: Ghost\nChannel: 0\nRSSI: -80\n";
        let neighbors = SpectrumAnalyser::parse_neighbor_scan(raw, Band::Band24);
        assert!(neighbors.is_empty());
    }

    #[test]
    fn non_overlapping_channels_get_a_bonus() {
        let scans = Vec::new();
        let score_1 = score_channel(&scans, Band::Band24, 1, None);
        let score_4 = score_channel(&scans, Band::Band24, 4, None);
        assert!(score_1 > score_4);
    }

    #[test]
    fn zigbee_overlap_penalises_colocated_channel() {
        let scans = Vec::new();
        let score_without = score_channel(&scans, Band::Band24, 6, None);
        let score_with = score_channel(&scans, Band::Band24, 6, Some(15));
        assert!(score_with < score_without);
    }

    #[test]
    fn aggregate_computes_utilisation_heuristic() {
        let neighbors = SpectrumAnalyser::parse_neighbor_scan(BLOCK_SAMPLE, Band::Band24);
        let scans = SpectrumAnalyser::aggregate(&neighbors, Band::Band24);
        let ch6 = scans.iter().find(|s| s.channel == 6).unwrap();
        assert_eq!(ch6.utilisation, 15.0);
    }
}
