pub mod client;
pub mod types;

pub use client::SnmpClient;
pub use types::{SwitchPort, SwitchStatus, SwitchWalkResult, VlanEntry};
