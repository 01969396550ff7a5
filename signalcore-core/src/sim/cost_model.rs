//! Cost model — slippage and commission for simulated fills.
//!
//! Slippage is directional: buyers pay more, sellers receive less.
//! Commission is symmetric per side in basis points of notional.

use crate::domain::OrderSide;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Slippage in basis points, applied directionally.
    pub slippage_bps: f64,
    /// Commission in basis points per side.
    pub commission_bps: f64,
}

impl CostModel {
    pub fn new(slippage_bps: f64, commission_bps: f64) -> Self {
        Self {
            slippage_bps,
            commission_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Apply slippage to a raw fill price.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide) -> f64 {
        if self.slippage_bps == 0.0 {
            return raw_price;
        }
        let slip_fraction = self.slippage_bps / 10_000.0;
        match side {
            OrderSide::Buy => raw_price * (1.0 + slip_fraction),
            OrderSide::Sell => raw_price * (1.0 - slip_fraction),
        }
    }

    /// `commission = fill_price * quantity * (commission_bps / 10_000)`
    pub fn compute_commission(&self, fill_price: f64, quantity: f64) -> f64 {
        fill_price * quantity * (self.commission_bps / 10_000.0)
    }
}
