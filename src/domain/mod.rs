//! Core domain types and decision logic.

pub mod error;
pub mod price;
pub mod price_table;
pub mod indicator;
pub mod quadrant;
pub mod config_validation;
pub mod strategy;
pub mod market_data;
pub mod scoring;
pub mod regime;
pub mod allocation;
pub mod confirmation;
pub mod position;
pub mod stops;
pub mod rebalance;
pub mod portfolio;
pub mod engine;
pub mod backtest;
pub mod metrics;
pub mod execution;
pub mod live;
pub mod robustness;
