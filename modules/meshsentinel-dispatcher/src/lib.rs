//! Ties the action catalogue, the `RadioController` adapter and the
//! envelope type together into the single `ActionDispatcher` entry
//! point the server binary drives.

mod action;
mod controller;
mod dispatcher;
mod response;

pub use action::{Action, DeviceFilter};
pub use controller::MeshRadioController;
pub use dispatcher::ActionDispatcher;
pub use response::Response;
