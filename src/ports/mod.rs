//! Port traits for the external collaborators of the engine.

pub mod broker_port;
pub mod config_port;
pub mod notifier_port;
pub mod price_port;
pub mod report_port;
pub mod state_store_port;
