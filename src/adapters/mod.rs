//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod file_notifier;
pub mod json_report_adapter;
pub mod json_state_store;
pub mod log_notifier;
pub mod paper_broker;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
