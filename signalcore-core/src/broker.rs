//! Broker trait — order and position access keyed by an opaque account.
//!
//! Real broker connectivity lives outside this crate; the simulated broker in
//! [`crate::sim`] implements the same trait so strategy code does not care
//! which one it is talking to.

use crate::domain::{AccountId, Order, OrderId, OrderParams, Position, PositionKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} is no longer open")]
    OrderNotOpen(OrderId),

    #[error("no position for {0}")]
    PositionNotFound(PositionKey),

    #[error("invalid quantity {0}")]
    InvalidQuantity(f64),

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Changes requested for a working order. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyOrder {
    pub quantity: Option<f64>,
    /// New limit/stop level. Ignored for market orders.
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl ModifyOrder {
    pub fn touches_protection(&self) -> bool {
        self.stop_loss.is_some() || self.take_profit.is_some()
    }
}

/// Order routing and position access.
pub trait Broker: Send + Sync {
    /// Human-readable name of this broker.
    fn name(&self) -> &str;

    /// Working orders for the account.
    fn get_orders(&self, account: &AccountId) -> Result<Vec<Order>, BrokerError>;

    /// Any order for the account, working or historical.
    fn get_order(&self, account: &AccountId, id: OrderId) -> Result<Option<Order>, BrokerError>;

    fn place_order(&self, account: &AccountId, params: OrderParams) -> Result<Order, BrokerError>;

    fn modify_order(
        &self,
        account: &AccountId,
        id: OrderId,
        changes: &ModifyOrder,
    ) -> Result<Order, BrokerError>;

    fn cancel_order(&self, account: &AccountId, id: OrderId) -> Result<Order, BrokerError>;

    fn get_positions(&self, account: &AccountId) -> Result<Vec<Position>, BrokerError>;

    /// Submit an order flattening the position, if there is one.
    fn close_position(&self, account: &AccountId, symbol: &str)
        -> Result<Option<Order>, BrokerError>;

    fn close_all_positions(&self, account: &AccountId) -> Result<Vec<Order>, BrokerError>;
}
