pub mod client;
pub mod types;

pub use client::HubClient;
pub use types::{HubEntity, HubEvent};
