use super::ids::{AccountId, PositionKey};
use super::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Net exposure for one (account, symbol).
///
/// `quantity` is the unsigned size; `side` carries the direction. A position
/// is removed from its broker rather than kept at zero quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    /// Floating profit at `current_price`.
    pub profit: f64,
    /// Protective offsets applied to this position, if any.
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.account.clone(), self.symbol.clone())
    }

    pub fn is_long(&self) -> bool {
        self.side == OrderSide::Buy
    }

    pub fn is_short(&self) -> bool {
        self.side == OrderSide::Sell
    }

    /// Quantity with sign: positive long, negative short.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.avg_entry_price) * self.quantity
    }

    /// Mark to the side of the book the position would exit on.
    pub fn mark(&mut self, bid: f64, ask: f64) {
        self.current_price = if self.is_long() { bid } else { ask };
        self.profit = self.unrealized_pnl(self.current_price);
    }
}
