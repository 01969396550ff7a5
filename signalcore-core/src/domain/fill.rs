use super::ids::{AccountId, OrderId};
use super::order::{OrderSide, ProtectiveKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fill record produced by the simulated broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub account: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub time: DateTime<Utc>,
    pub protective: Option<ProtectiveKind>,
}
