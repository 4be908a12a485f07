//! Broker execution port trait.

use crate::domain::error::QuadtraderError;
use crate::domain::execution::{Fill, OrderSide};
use std::collections::BTreeMap;

pub trait BrokerPort {
    /// Signed quantity held per ticker.
    fn get_positions(&self) -> Result<BTreeMap<String, f64>, QuadtraderError>;

    fn get_account_value(&self) -> Result<f64, QuadtraderError>;

    fn place_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, QuadtraderError>;
}
