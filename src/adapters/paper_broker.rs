//! Simulated broker account.
//!
//! Fills every order immediately at the last known price. The account can
//! be persisted as JSON so successive live runs trade the same book.

use crate::domain::error::QuadtraderError;
use crate::domain::execution::{Fill, OrderSide};
use crate::ports::broker_port::BrokerPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperAccount {
    /// May go negative when the book is leveraged.
    pub cash: f64,
    pub positions: BTreeMap<String, f64>,
}

pub struct PaperBroker {
    account: PaperAccount,
    prices: BTreeMap<String, f64>,
    path: Option<PathBuf>,
}

impl PaperBroker {
    pub fn new(initial_cash: f64) -> Self {
        PaperBroker {
            account: PaperAccount {
                cash: initial_cash,
                positions: BTreeMap::new(),
            },
            prices: BTreeMap::new(),
            path: None,
        }
    }

    /// Opens the account stored at `path`, or a fresh one with `initial_cash`.
    pub fn open<P: AsRef<Path>>(path: P, initial_cash: f64) -> Result<Self, QuadtraderError> {
        let path = path.as_ref().to_path_buf();
        let account = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| QuadtraderError::Persistence {
                reason: format!("corrupt paper account {}: {e}", path.display()),
            })?
        } else {
            PaperAccount {
                cash: initial_cash,
                positions: BTreeMap::new(),
            }
        };
        Ok(PaperBroker {
            account,
            prices: BTreeMap::new(),
            path: Some(path),
        })
    }

    pub fn set_prices(&mut self, prices: BTreeMap<String, f64>) {
        self.prices = prices;
    }

    pub fn account(&self) -> &PaperAccount {
        &self.account
    }

    pub fn save(&self) -> Result<(), QuadtraderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.account)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl BrokerPort for PaperBroker {
    fn get_positions(&self) -> Result<BTreeMap<String, f64>, QuadtraderError> {
        Ok(self.account.positions.clone())
    }

    fn get_account_value(&self) -> Result<f64, QuadtraderError> {
        let mut value = self.account.cash;
        for (ticker, qty) in &self.account.positions {
            let price = self
                .prices
                .get(ticker)
                .ok_or_else(|| QuadtraderError::Execution {
                    ticker: ticker.clone(),
                    reason: "no price to value position".into(),
                })?;
            value += qty * price;
        }
        Ok(value)
    }

    fn place_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, QuadtraderError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(QuadtraderError::Execution {
                ticker: ticker.to_string(),
                reason: format!("invalid quantity {quantity}"),
            });
        }
        let price = self
            .prices
            .get(ticker)
            .copied()
            .ok_or_else(|| QuadtraderError::Execution {
                ticker: ticker.to_string(),
                reason: "no price".into(),
            })?;

        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        self.account.cash -= signed * price;
        let held = self.account.positions.entry(ticker.to_string()).or_insert(0.0);
        *held += signed;
        if held.abs() < 1e-9 {
            self.account.positions.remove(ticker);
        }

        Ok(Fill {
            ticker: ticker.to_string(),
            side,
            quantity,
            price,
        })
    }
}
