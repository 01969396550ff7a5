//! Simulated matching broker — an in-memory exchange.
//!
//! Holds the working orders and the single net position for every
//! (account, symbol) key. Bars are expanded into synthetic ticks and each
//! working order on the bar's symbol is tested tick by tick; a triggered
//! order fills in full at the tick's price. Fills feed the position, which
//! in turn owns its protective stop-loss/take-profit orders:
//!
//! - first fill for a key opens a position and places its protection
//! - same-direction fills extend it (volume-weighted average, net of commission)
//! - opposite fills reduce it, close it, or flip it
//! - every extension/reduction cancels and re-places the protection at the new
//!   level and size; a protective order is never amended in place
//!
//! Orders placed while a bar is being processed are not evaluated until the
//! next bar, so a position and its protection can never both fill on one bar.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::broker::{Broker, BrokerError, ModifyOrder};
use crate::domain::{
    AccountId, Bar, Fill, Order, OrderId, OrderParams, OrderSide, Position, PositionKey,
    ProtectiveKind, TimeInForce, TradeSignal,
};

use super::activity::{ActivityKind, ActivityLog};
use super::cost_model::CostModel;
use super::ticks::synthesize_ticks;
use super::trigger::check_trigger;

/// Quantities below this are treated as zero.
const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct SimulatedBroker {
    /// Working orders per key. Filled and cancelled orders move to `history`.
    open_orders: BTreeMap<PositionKey, Vec<Order>>,
    history: Vec<Order>,
    /// At most one position per key; absent when flat.
    positions: BTreeMap<PositionKey, Position>,
    fills: Vec<Fill>,
    activity: ActivityLog,
    cost_model: CostModel,
    next_id: u64,
    /// Time of the last processed bar; stamps orders placed between bars.
    clock: DateTime<Utc>,
}

impl SimulatedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_model(cost_model: CostModel) -> Self {
        Self {
            cost_model,
            ..Self::default()
        }
    }

    pub fn cost_model(&self) -> CostModel {
        self.cost_model
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.clock = time;
    }

    /// Drop all orders, positions, fills and activity, keeping the cost model.
    pub fn reset(&mut self) {
        *self = Self::with_cost_model(self.cost_model);
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Working or historical order by ID.
    pub fn get_order(&self, id: OrderId) -> Option<&Order> {
        self.open_orders
            .values()
            .flatten()
            .chain(self.history.iter())
            .find(|o| o.id == id)
    }

    /// Working orders for an account.
    pub fn open_orders(&self, account: &AccountId) -> Vec<Order> {
        self.open_orders
            .iter()
            .filter(|(k, _)| k.account == *account)
            .flat_map(|(_, orders)| orders.iter().cloned())
            .collect()
    }

    /// Working orders for one (account, symbol).
    pub fn orders_for(&self, key: &PositionKey) -> &[Order] {
        self.open_orders.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Filled and cancelled orders, oldest first.
    pub fn order_history(&self) -> &[Order] {
        &self.history
    }

    pub fn position(&self, account: &AccountId, symbol: &str) -> Option<&Position> {
        self.positions
            .get(&PositionKey::new(account.clone(), symbol))
    }

    pub fn positions(&self, account: &AccountId) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.account == *account)
            .cloned()
            .collect()
    }

    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Every fill so far, as market trade signals at the fill price.
    pub fn fill_signals(&self) -> Vec<TradeSignal> {
        self.fills
            .iter()
            .map(|f| TradeSignal::market(f.symbol.clone(), f.side, f.quantity, f.price, f.time))
            .collect()
    }

    // ── Order entry ────────────────────────────────────────────────────

    pub fn place_order(
        &mut self,
        account: &AccountId,
        params: OrderParams,
    ) -> Result<Order, BrokerError> {
        validate_params(&params)?;
        Ok(self.insert_order(account, params, None))
    }

    pub fn cancel_order(&mut self, account: &AccountId, id: OrderId) -> Result<Order, BrokerError> {
        let key = self.locate_for(account, id)?;
        let order = self
            .cancel_internal(&key, id, "cancelled by request")
            .ok_or(BrokerError::OrderNotFound(id))?;

        // A protection the caller removed by hand is not re-placed later.
        if let Some(kind) = order.protective {
            if let Some(pos) = self.positions.get_mut(&key) {
                match kind {
                    ProtectiveKind::StopLoss => pos.stop_loss = None,
                    ProtectiveKind::TakeProfit => pos.take_profit = None,
                }
            }
        }
        Ok(order)
    }

    /// Amend a working order.
    ///
    /// Regular orders are amended in place. Changing stop-loss/take-profit is
    /// only allowed before any fill, and re-places the protection of an open
    /// position the order would extend. Protective orders only accept a new
    /// price and are cancelled and re-placed, returning the replacement.
    pub fn modify_order(
        &mut self,
        account: &AccountId,
        id: OrderId,
        changes: &ModifyOrder,
    ) -> Result<Order, BrokerError> {
        validate_modify(changes)?;
        let key = self.locate_for(account, id)?;
        let current = self
            .find_open(&key, id)
            .cloned()
            .ok_or(BrokerError::OrderNotFound(id))?;

        if let Some(kind) = current.protective {
            return self.replace_protective_order(&key, &current, kind, changes);
        }

        if changes.touches_protection() && current.filled_quantity > 0.0 {
            return Err(BrokerError::Rejected(format!(
                "order {id} is partially filled; stop-loss/take-profit can no longer change"
            )));
        }
        if let Some(qty) = changes.quantity {
            if qty < current.filled_quantity + current.cancelled_quantity {
                return Err(BrokerError::InvalidQuantity(qty));
            }
        }

        let time = self.clock;
        let order = self
            .find_open_mut(&key, id)
            .ok_or(BrokerError::OrderNotFound(id))?;
        if let Some(qty) = changes.quantity {
            order.quantity = qty;
        }
        if let Some(price) = changes.price {
            order.order_type = order.order_type.with_price(price);
        }
        if let Some(sl) = changes.stop_loss {
            order.stop_loss = Some(sl);
        }
        if let Some(tp) = changes.take_profit {
            order.take_profit = Some(tp);
        }
        let updated = order.clone();
        self.activity.record(
            time,
            ActivityKind::OrderModified,
            &key,
            Some(id),
            describe_order(&updated),
        );

        if changes.touches_protection() {
            if let Some(pos) = self.positions.get_mut(&key) {
                if pos.side == updated.side {
                    if changes.stop_loss.is_some() {
                        pos.stop_loss = changes.stop_loss;
                    }
                    if changes.take_profit.is_some() {
                        pos.take_profit = changes.take_profit;
                    }
                    self.replace_protection(&key);
                }
            }
        }
        Ok(updated)
    }

    /// Set (or clear, with `None`) the protective offsets of an open position.
    pub fn modify_position_protection(
        &mut self,
        account: &AccountId,
        symbol: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Position, BrokerError> {
        for offset in [stop_loss, take_profit].into_iter().flatten() {
            validate_offset(offset)?;
        }
        let key = PositionKey::new(account.clone(), symbol);
        let pos = self
            .positions
            .get_mut(&key)
            .ok_or_else(|| BrokerError::PositionNotFound(key.clone()))?;
        pos.stop_loss = stop_loss;
        pos.take_profit = take_profit;
        let updated = pos.clone();
        self.replace_protection(&key);
        Ok(updated)
    }

    /// Submit a market order opposite to the position. The position itself
    /// only changes when that order fills.
    pub fn close_position(&mut self, account: &AccountId, symbol: &str) -> Option<Order> {
        let key = PositionKey::new(account.clone(), symbol);
        let pos = self.positions.get(&key)?;
        let params = OrderParams::market(symbol, pos.side.opposite(), pos.quantity)
            .with_origin("close_position");
        Some(self.insert_order(account, params, None))
    }

    pub fn close_all_positions(&mut self, account: &AccountId) -> Vec<Order> {
        let symbols: Vec<String> = self
            .positions
            .keys()
            .filter(|k| k.account == *account)
            .map(|k| k.symbol.clone())
            .collect();
        symbols
            .iter()
            .filter_map(|s| self.close_position(account, s))
            .collect()
    }

    // ── Matching ───────────────────────────────────────────────────────

    /// Match every working order on `symbol` against the synthetic ticks of `bar`.
    ///
    /// Each order fills at most once per call. Returns the fills in the order
    /// they happened.
    pub fn process_bar(&mut self, symbol: &str, bar: &Bar) -> Vec<Fill> {
        if bar.is_void() {
            return Vec::new();
        }
        self.expire_day_orders(symbol, bar.time);
        let ticks = synthesize_ticks(bar);
        self.clock = bar.time;

        let candidates: Vec<(PositionKey, OrderId)> = self
            .open_orders
            .iter()
            .filter(|(k, _)| k.symbol == symbol)
            .flat_map(|(k, orders)| {
                orders
                    .iter()
                    .filter(|o| o.is_open() && !o.price_hit)
                    .map(move |o| (k.clone(), o.id))
            })
            .collect();

        let mut fills = Vec::new();
        for (key, id) in candidates {
            // An earlier fill on this bar may have cancelled it.
            let Some(order) = self.find_open(&key, id) else {
                continue;
            };
            let tif = order.time_in_force;
            let hit = ticks
                .iter()
                .find_map(|t| check_trigger(order, t).map(|price| (price, t.time)));

            match hit {
                Some((price, time)) => {
                    if let Some(fill) = self.execute(&key, id, price, time) {
                        fills.push(fill);
                    }
                }
                None if matches!(tif, TimeInForce::Ioc | TimeInForce::Fok) => {
                    self.cancel_internal(&key, id, "time in force expired");
                }
                None => {}
            }
        }

        let close = ticks[ticks.len() - 1];
        for (key, pos) in self.positions.iter_mut() {
            if key.symbol == symbol {
                pos.mark(close.bid, close.ask);
            }
        }
        fills
    }

    fn execute(
        &mut self,
        key: &PositionKey,
        id: OrderId,
        raw_price: f64,
        time: DateTime<Utc>,
    ) -> Option<Fill> {
        let cost = self.cost_model;
        let order = self.find_open_mut(key, id)?;
        order.price_hit = true;
        let price = cost.apply_slippage(raw_price, order.side);
        let qty = order.open_quantity();
        let commission = cost.compute_commission(price, qty);
        let filled = order.apply_fill(qty, price, commission, time);

        let fill = Fill {
            order_id: id,
            account: key.account.clone(),
            symbol: key.symbol.clone(),
            side: order.side,
            price,
            quantity: filled,
            commission,
            time,
            protective: order.protective,
        };
        let (stop_loss, take_profit) = (order.stop_loss, order.take_profit);

        if let Some(done) = self.take_open(key, id) {
            self.history.push(done);
        }
        self.activity.record(
            time,
            ActivityKind::OrderFilled,
            key,
            Some(id),
            format!("{:?} {} @ {}", fill.side, fill.quantity, fill.price),
        );
        self.fills.push(fill.clone());
        self.apply_to_position(key, &fill, stop_loss, take_profit);
        Some(fill)
    }

    fn apply_to_position(
        &mut self,
        key: &PositionKey,
        fill: &Fill,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) {
        let time = fill.time;
        let Some(pos) = self.positions.get_mut(key) else {
            self.open_position(key, fill.side, fill.quantity, fill.price, stop_loss, take_profit, time);
            return;
        };

        if pos.side == fill.side {
            let total = pos.quantity + fill.quantity;
            pos.avg_entry_price = (pos.quantity * pos.avg_entry_price
                + fill.quantity * fill.price
                - fill.commission)
                / total;
            pos.quantity = total;
            pos.updated_at = time;
            if stop_loss.is_some() {
                pos.stop_loss = stop_loss;
            }
            if take_profit.is_some() {
                pos.take_profit = take_profit;
            }
            let msg = format!("{:?} {} @ {:.6}", pos.side, pos.quantity, pos.avg_entry_price);
            self.activity
                .record(time, ActivityKind::PositionUpdated, key, Some(fill.order_id), msg);
            self.replace_protection(key);
            return;
        }

        let reduce = fill.quantity.min(pos.quantity);
        let remaining = pos.quantity - reduce;
        let leftover = fill.quantity - reduce;

        if remaining > QTY_EPSILON {
            pos.quantity = remaining;
            pos.updated_at = time;
            let msg = format!("{:?} reduced to {}", pos.side, remaining);
            self.activity
                .record(time, ActivityKind::PositionUpdated, key, Some(fill.order_id), msg);
            self.replace_protection(key);
            return;
        }

        self.positions.remove(key);
        self.activity.record(
            time,
            ActivityKind::PositionClosed,
            key,
            Some(fill.order_id),
            format!("closed @ {}", fill.price),
        );
        self.cancel_protection(key);

        if leftover > QTY_EPSILON {
            self.open_position(key, fill.side, leftover, fill.price, stop_loss, take_profit, time);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn open_position(
        &mut self,
        key: &PositionKey,
        side: OrderSide,
        quantity: f64,
        price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        time: DateTime<Utc>,
    ) {
        let pos = Position {
            account: key.account.clone(),
            symbol: key.symbol.clone(),
            side,
            quantity,
            avg_entry_price: price,
            current_price: price,
            profit: 0.0,
            stop_loss,
            take_profit,
            opened_at: time,
            updated_at: time,
        };
        self.positions.insert(key.clone(), pos);
        self.activity.record(
            time,
            ActivityKind::PositionCreated,
            key,
            None,
            format!("{side:?} {quantity} @ {price}"),
        );
        self.replace_protection(key);
    }

    // ── Protection ─────────────────────────────────────────────────────

    /// Cancel outstanding protective orders for `key` and, if a position is
    /// open, place fresh ones anchored off its average entry price.
    fn replace_protection(&mut self, key: &PositionKey) {
        self.cancel_protection(key);
        let Some(pos) = self.positions.get(key) else {
            return;
        };
        let exit = pos.side.opposite();
        let dir = pos.side.sign();
        let (qty, avg) = (pos.quantity, pos.avg_entry_price);
        let account = pos.account.clone();

        let mut wanted = Vec::new();
        if let Some(offset) = pos.stop_loss {
            wanted.push((
                ProtectiveKind::StopLoss,
                OrderParams::stop(key.symbol.clone(), exit, qty, avg - dir * offset),
            ));
        }
        if let Some(offset) = pos.take_profit {
            wanted.push((
                ProtectiveKind::TakeProfit,
                OrderParams::limit(key.symbol.clone(), exit, qty, avg + dir * offset),
            ));
        }
        for (kind, params) in wanted {
            let level = params.order_type.price().unwrap_or_default();
            if level <= 0.0 || !level.is_finite() {
                warn!(key = %key, ?kind, level, "skipping protective order at non-positive level");
                continue;
            }
            self.insert_order(&account, params.with_origin("protection"), Some(kind));
        }
    }

    fn cancel_protection(&mut self, key: &PositionKey) {
        let ids: Vec<OrderId> = self
            .orders_for(key)
            .iter()
            .filter(|o| o.is_protective())
            .map(|o| o.id)
            .collect();
        for id in ids {
            self.cancel_internal(key, id, "protection replaced");
        }
    }

    /// Cancel a protective order and place a new one at the requested level,
    /// updating the position's offset so later re-placements keep it.
    fn replace_protective_order(
        &mut self,
        key: &PositionKey,
        current: &Order,
        kind: ProtectiveKind,
        changes: &ModifyOrder,
    ) -> Result<Order, BrokerError> {
        if changes.quantity.is_some() || changes.touches_protection() {
            return Err(BrokerError::Rejected(
                "protective orders only accept a new price".into(),
            ));
        }
        let Some(price) = changes.price else {
            return Ok(current.clone());
        };
        if let Some(pos) = self.positions.get_mut(key) {
            let offset = match kind {
                ProtectiveKind::StopLoss => pos.side.sign() * (pos.avg_entry_price - price),
                ProtectiveKind::TakeProfit => pos.side.sign() * (price - pos.avg_entry_price),
            };
            match kind {
                ProtectiveKind::StopLoss => pos.stop_loss = Some(offset),
                ProtectiveKind::TakeProfit => pos.take_profit = Some(offset),
            }
        }
        self.cancel_internal(key, current.id, "protection replaced");
        let params = OrderParams {
            order_type: current.order_type.with_price(price),
            ..OrderParams::new(
                key.symbol.clone(),
                current.side,
                current.open_quantity(),
                current.order_type,
            )
        }
        .with_origin("protection");
        Ok(self.insert_order(&key.account, params, Some(kind)))
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn insert_order(
        &mut self,
        account: &AccountId,
        params: OrderParams,
        protective: Option<ProtectiveKind>,
    ) -> Order {
        self.next_id += 1;
        let id = OrderId(self.next_id);
        let key = PositionKey::new(account.clone(), params.symbol.clone());
        let order = Order::from_params(id, account.clone(), params, protective, self.clock);
        self.activity.record(
            self.clock,
            ActivityKind::OrderPlaced,
            &key,
            Some(id),
            describe_order(&order),
        );
        self.open_orders.entry(key).or_default().push(order.clone());
        order
    }

    fn cancel_internal(&mut self, key: &PositionKey, id: OrderId, reason: &str) -> Option<Order> {
        let mut order = self.take_open(key, id)?;
        let qty = order.cancel_remaining();
        self.activity.record(
            self.clock,
            ActivityKind::OrderCancelled,
            key,
            Some(id),
            format!("{qty} cancelled: {reason}"),
        );
        self.history.push(order.clone());
        Some(order)
    }

    fn expire_day_orders(&mut self, symbol: &str, time: DateTime<Utc>) {
        let today = time.date_naive();
        let expired: Vec<(PositionKey, OrderId)> = self
            .open_orders
            .iter()
            .filter(|(k, _)| k.symbol == symbol)
            .flat_map(|(k, orders)| {
                orders
                    .iter()
                    .filter(|o| {
                        o.time_in_force == TimeInForce::Day && o.placed_at.date_naive() < today
                    })
                    .map(move |o| (k.clone(), o.id))
            })
            .collect();
        for (key, id) in expired {
            self.cancel_internal(&key, id, "day order expired");
        }
    }

    /// Key of a working order, checked against the caller's account.
    fn locate_for(&self, account: &AccountId, id: OrderId) -> Result<PositionKey, BrokerError> {
        let key = self
            .open_orders
            .iter()
            .find(|(_, orders)| orders.iter().any(|o| o.id == id))
            .map(|(k, _)| k.clone());
        match key {
            Some(k) if k.account == *account => Ok(k),
            Some(_) => Err(BrokerError::OrderNotFound(id)),
            None if self.history.iter().any(|o| o.id == id && o.account == *account) => {
                Err(BrokerError::OrderNotOpen(id))
            }
            None => Err(BrokerError::OrderNotFound(id)),
        }
    }

    fn find_open(&self, key: &PositionKey, id: OrderId) -> Option<&Order> {
        self.open_orders.get(key)?.iter().find(|o| o.id == id)
    }

    fn find_open_mut(&mut self, key: &PositionKey, id: OrderId) -> Option<&mut Order> {
        self.open_orders.get_mut(key)?.iter_mut().find(|o| o.id == id)
    }

    fn take_open(&mut self, key: &PositionKey, id: OrderId) -> Option<Order> {
        let orders = self.open_orders.get_mut(key)?;
        let idx = orders.iter().position(|o| o.id == id)?;
        let order = orders.remove(idx);
        if orders.is_empty() {
            self.open_orders.remove(key);
        }
        Some(order)
    }
}

fn describe_order(order: &Order) -> String {
    let tag = match order.protective {
        Some(ProtectiveKind::StopLoss) => "stop-loss ",
        Some(ProtectiveKind::TakeProfit) => "take-profit ",
        None => "",
    };
    match order.order_type.price() {
        Some(level) => format!(
            "{tag}{} {:?} {} @ {level}",
            order.order_type.name(),
            order.side,
            order.quantity
        ),
        None => format!("{tag}{} {:?} {}", order.order_type.name(), order.side, order.quantity),
    }
}

fn validate_quantity(qty: f64) -> Result<(), BrokerError> {
    if qty.is_finite() && qty > 0.0 {
        Ok(())
    } else {
        Err(BrokerError::InvalidQuantity(qty))
    }
}

fn validate_price(price: f64) -> Result<(), BrokerError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(BrokerError::InvalidPrice(price))
    }
}

fn validate_offset(offset: f64) -> Result<(), BrokerError> {
    if offset.is_finite() && offset > 0.0 {
        Ok(())
    } else {
        Err(BrokerError::Rejected(format!(
            "protective offset must be positive, got {offset}"
        )))
    }
}

fn validate_params(params: &OrderParams) -> Result<(), BrokerError> {
    validate_quantity(params.quantity)?;
    if let Some(level) = params.order_type.price() {
        validate_price(level)?;
    }
    for offset in [params.stop_loss, params.take_profit].into_iter().flatten() {
        validate_offset(offset)?;
    }
    Ok(())
}

fn validate_modify(changes: &ModifyOrder) -> Result<(), BrokerError> {
    if let Some(qty) = changes.quantity {
        validate_quantity(qty)?;
    }
    if let Some(price) = changes.price {
        validate_price(price)?;
    }
    for offset in [changes.stop_loss, changes.take_profit].into_iter().flatten() {
        validate_offset(offset)?;
    }
    Ok(())
}

impl Broker for Mutex<SimulatedBroker> {
    fn name(&self) -> &str {
        "simulated"
    }

    fn get_orders(&self, account: &AccountId) -> Result<Vec<Order>, BrokerError> {
        Ok(self.lock().open_orders(account))
    }

    fn get_order(&self, account: &AccountId, id: OrderId) -> Result<Option<Order>, BrokerError> {
        Ok(self
            .lock()
            .get_order(id)
            .filter(|o| o.account == *account)
            .cloned())
    }

    fn place_order(&self, account: &AccountId, params: OrderParams) -> Result<Order, BrokerError> {
        self.lock().place_order(account, params)
    }

    fn modify_order(
        &self,
        account: &AccountId,
        id: OrderId,
        changes: &ModifyOrder,
    ) -> Result<Order, BrokerError> {
        self.lock().modify_order(account, id, changes)
    }

    fn cancel_order(&self, account: &AccountId, id: OrderId) -> Result<Order, BrokerError> {
        self.lock().cancel_order(account, id)
    }

    fn get_positions(&self, account: &AccountId) -> Result<Vec<Position>, BrokerError> {
        Ok(self.lock().positions(account))
    }

    fn close_position(
        &self,
        account: &AccountId,
        symbol: &str,
    ) -> Result<Option<Order>, BrokerError> {
        Ok(self.lock().close_position(account, symbol))
    }

    fn close_all_positions(&self, account: &AccountId) -> Result<Vec<Order>, BrokerError> {
        Ok(self.lock().close_all_positions(account))
    }
}
