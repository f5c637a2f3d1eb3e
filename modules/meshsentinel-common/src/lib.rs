pub mod channel_plan;
pub mod config;
pub mod error;
pub mod types;

pub use channel_plan::ChannelPlan;
pub use config::Config;
pub use error::{MeshError, MeshResult};
pub use types::*;

/// Canonicalize a hardware address into lowercase colon-separated form
/// (`AA-BB-CC-DD-EE-FF` or `aabb.ccdd.eeff` → `aa:bb:cc:dd:ee:ff`).
/// `DeviceShell`/`HubClient`/`SnmpClient` output all funnel through this
/// so every collaborator's data joins on the same key.
///
/// ```
/// assert_eq!(meshsentinel_common::canonical_hw_address("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
/// assert_eq!(meshsentinel_common::canonical_hw_address("aabb.ccdd.eeff"), "aa:bb:cc:dd:ee:ff");
/// ```
pub fn canonical_hw_address(raw: &str) -> String {
    let hex: String = raw.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let hex = hex.to_lowercase();
    hex.as_bytes()
        .chunks(2)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_dash_form() {
        assert_eq!(canonical_hw_address("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn canonicalizes_cisco_dot_form() {
        assert_eq!(canonical_hw_address("aabb.ccdd.eeff"), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn passthrough_already_canonical() {
        assert_eq!(
            canonical_hw_address("aa:bb:cc:dd:ee:ff"),
            "aa:bb:cc:dd:ee:ff"
        );
    }
}
