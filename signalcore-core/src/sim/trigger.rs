//! Trigger checking — does a tick make a pending order marketable?
//!
//! Market and stop orders fill on the aggressive side of the spread (ask for
//! buys, bid for sells). Limit orders fill on the passive side (bid for buy
//! limits, ask for sell limits).

use crate::domain::{Order, OrderSide, OrderType, Tick};

/// Fill price if `tick` triggers `order`, `None` otherwise.
///
/// Does not look at `price_hit` or order status; the caller decides which
/// orders are eligible.
pub fn check_trigger(order: &Order, tick: &Tick) -> Option<f64> {
    if tick.bid.is_nan() || tick.ask.is_nan() {
        return None;
    }
    match order.order_type {
        OrderType::Market => Some(aggressive_price(order.side, tick)),
        OrderType::Stop { stop_price } => check_stop(order.side, stop_price, tick),
        OrderType::Limit { limit_price } => check_limit(order.side, limit_price, tick),
    }
}

/// Buy stop: ask has risen to the stop. Sell stop: bid has fallen to it.
fn check_stop(side: OrderSide, stop: f64, tick: &Tick) -> Option<f64> {
    let hit = match side {
        OrderSide::Buy => tick.ask >= stop,
        OrderSide::Sell => tick.bid <= stop,
    };
    hit.then(|| aggressive_price(side, tick))
}

/// Buy limit: bid at or below the limit. Sell limit: ask at or above it.
fn check_limit(side: OrderSide, limit: f64, tick: &Tick) -> Option<f64> {
    match side {
        OrderSide::Buy => (tick.bid <= limit).then_some(tick.bid),
        OrderSide::Sell => (tick.ask >= limit).then_some(tick.ask),
    }
}

fn aggressive_price(side: OrderSide, tick: &Tick) -> f64 {
    match side {
        OrderSide::Buy => tick.ask,
        OrderSide::Sell => tick.bid,
    }
}
