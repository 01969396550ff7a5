//! Order types, order requests and the order record kept by brokers.

use super::ids::{AccountId, OrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// What kind of order and its price parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill on the first available tick.
    Market,
    /// Fill at the limit price or better.
    Limit { limit_price: f64 },
    /// Becomes marketable once price trades through the stop level.
    Stop { stop_price: f64 },
}

impl OrderType {
    /// The limit/stop level, if the type carries one.
    pub fn price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(*limit_price),
            OrderType::Stop { stop_price } => Some(*stop_price),
        }
    }

    /// Same variant with its level replaced. Market orders are unchanged.
    pub fn with_price(self, price: f64) -> Self {
        match self {
            OrderType::Market => OrderType::Market,
            OrderType::Limit { .. } => OrderType::Limit { limit_price: price },
            OrderType::Stop { .. } => OrderType::Stop { stop_price: price },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit { .. } => "limit",
            OrderType::Stop { .. } => "stop",
        }
    }
}

/// How long an unfilled order stays working.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Cancelled once a bar from a later calendar day is processed.
    Day,
    /// Good till cancelled.
    #[default]
    Gtc,
    /// Immediate or cancel: whatever is not filled on the first evaluation is cancelled.
    Ioc,
    /// Fill or kill. Fills are all-or-nothing in the simulator, so this behaves like `Ioc`.
    Fok,
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

/// Automatically generated order protecting an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectiveKind {
    StopLoss,
    TakeProfit,
}

/// A request to place an order, before a broker has accepted it.
///
/// `stop_loss` and `take_profit` are price offsets from the fill price, not
/// absolute levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    /// Tag linking the order back to the strategy that created it.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl OrderParams {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: f64, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type,
            time_in_force: TimeInForce::Gtc,
            stop_loss: None,
            take_profit: None,
            origin: None,
            comment: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self::new(symbol, side, quantity, OrderType::Market)
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, limit_price: f64) -> Self {
        Self::new(symbol, side, quantity, OrderType::Limit { limit_price })
    }

    pub fn stop(symbol: impl Into<String>, side: OrderSide, quantity: f64, stop_price: f64) -> Self {
        Self::new(symbol, side, quantity, OrderType::Stop { stop_price })
    }

    pub fn with_stop_loss(mut self, offset: f64) -> Self {
        self.stop_loss = Some(offset);
        self
    }

    pub fn with_take_profit(mut self, offset: f64) -> Self {
        self.take_profit = Some(offset);
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// An order accepted by a broker.
///
/// Invariant: `filled_quantity + cancelled_quantity <= quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub cancelled_quantity: f64,
    pub avg_fill_price: f64,
    pub commission: f64,
    pub time_in_force: TimeInForce,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub origin: Option<String>,
    pub comment: Option<String>,
    /// Set when this order was generated by the broker to protect a position.
    pub protective: Option<ProtectiveKind>,
    /// Latched once a tick met the trigger condition.
    pub price_hit: bool,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn from_params(
        id: OrderId,
        account: AccountId,
        params: OrderParams,
        protective: Option<ProtectiveKind>,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account,
            symbol: params.symbol,
            side: params.side,
            order_type: params.order_type,
            quantity: params.quantity,
            filled_quantity: 0.0,
            cancelled_quantity: 0.0,
            avg_fill_price: 0.0,
            commission: 0.0,
            time_in_force: params.time_in_force,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            origin: params.origin,
            comment: params.comment,
            protective,
            price_hit: false,
            status: OrderStatus::Open,
            placed_at,
            filled_at: None,
        }
    }

    /// Quantity still working: neither filled nor cancelled.
    pub fn open_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity - self.cancelled_quantity).max(0.0)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_protective(&self) -> bool {
        self.protective.is_some()
    }

    /// Record a fill of up to `quantity` at `price`. Returns the quantity actually filled.
    pub fn apply_fill(&mut self, quantity: f64, price: f64, commission: f64, at: DateTime<Utc>) -> f64 {
        let qty = quantity.min(self.open_quantity());
        if qty <= 0.0 {
            return 0.0;
        }
        let notional = self.avg_fill_price * self.filled_quantity + price * qty;
        self.filled_quantity += qty;
        self.avg_fill_price = notional / self.filled_quantity;
        self.commission += commission;
        self.filled_at = Some(at);
        self.status = if self.open_quantity() <= f64::EPSILON {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        qty
    }

    /// Cancel whatever is still working. Returns the quantity cancelled.
    pub fn cancel_remaining(&mut self) -> f64 {
        let qty = self.open_quantity();
        self.cancelled_quantity += qty;
        self.status = OrderStatus::Cancelled;
        qty
    }
}
