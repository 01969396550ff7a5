//! TradeSignal — an order intent emitted by a strategy.

use super::order::{OrderParams, OrderSide, OrderType, TimeInForce};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intent to trade, consumed once to produce an order (live) or a trade-log
/// entry (backtest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub instrument: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub time: DateTime<Utc>,
}

impl TradeSignal {
    /// A market intent executed at `price`.
    pub fn market(
        instrument: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            quantity,
            price,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            stop_loss: None,
            take_profit: None,
            time,
        }
    }

    /// Quantity with sign: positive buys, negative sells.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn into_order_params(self, origin: Option<String>) -> OrderParams {
        OrderParams {
            symbol: self.instrument,
            side: self.side,
            quantity: self.quantity,
            order_type: self.order_type,
            time_in_force: self.time_in_force,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            origin,
            comment: None,
        }
    }
}
