//! Strategy callback trait — the interface user strategies implement.
//!
//! The lifecycle in [`crate::signal`] owns one `Arc<dyn Strategy>` and calls
//! these hooks. All hooks take `&self`: strategies keep per-run state in the
//! values they return or behind their own interior mutability, so one instance
//! can serve concurrent sweep workers.

use signalcore_core::broker::BrokerError;
use signalcore_core::data::DataProvider;
use signalcore_core::domain::{
    AccountId, Bar, Order, OrderParams, ParamSet, ScriptingParameter, Selection, Tick,
    TradeSignal,
};
use signalcore_core::sim::SimulatedBroker;

use crate::replay::{replay_bars, BarStep};
use crate::signal::Signal;

/// What woke the strategy up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    NewTick,
    NewBar,
    Timer,
    Manual,
}

/// A buffered market event handed to `internal_start`.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    Tick { symbol: String, tick: Tick },
    Bar(Bar),
}

impl StrategyEvent {
    pub fn symbol(&self) -> &str {
        match self {
            StrategyEvent::Tick { symbol, .. } => symbol,
            StrategyEvent::Bar(bar) => &bar.symbol,
        }
    }
}

/// Everything a strategy sees while backtesting one (slot, combination).
pub struct SlotContext<'a> {
    pub slot: u32,
    pub selections: &'a [Selection],
    pub params: &'a ParamSet,
    pub data: &'a dyn DataProvider,
    /// Fresh broker for this combination.
    pub broker: &'a mut SimulatedBroker,
    pub account: &'a AccountId,
}

impl SlotContext<'_> {
    /// Drive the combination's broker through `bars`, calling `on_bar` after
    /// each bar is matched. Returns the resulting fills as trade signals.
    pub fn replay<F>(&mut self, bars: &[Bar], on_bar: F) -> anyhow::Result<Vec<TradeSignal>>
    where
        F: FnMut(&mut BarStep<'_>) -> anyhow::Result<()>,
    {
        replay_bars(self.broker, self.account, bars, on_bar)
    }
}

/// User strategy callbacks.
pub trait Strategy: Send + Sync {
    /// Strategy name, used as the signal name and alert source.
    fn name(&self) -> &str;

    /// Declared parameters with their defaults and sweep ranges.
    fn parameters(&self) -> Vec<ScriptingParameter>;

    /// One-time setup after parameters are applied.
    fn internal_init(&self, _signal: &Signal) -> anyhow::Result<()> {
        Ok(())
    }

    /// Per-event logic for live and simulated running.
    fn internal_start(
        &self,
        signal: &Signal,
        trigger: StartTrigger,
        events: &[StrategyEvent],
    ) -> anyhow::Result<()>;

    /// Produce the trades of one backtest combination on one data slot.
    fn backtest_slot_item(&self, ctx: &mut SlotContext<'_>) -> anyhow::Result<Vec<TradeSignal>>;

    /// Inspect or veto an order before it is sent. `None` drops it.
    fn analyze_pre_trade(&self, params: OrderParams) -> Option<OrderParams> {
        Some(params)
    }

    /// Called after an order was accepted.
    fn analyze_post_trade(&self, _order: &Order) {}

    /// Called when the broker rejected or failed an order action.
    fn process_trade_failure(&self, _params: &OrderParams, _error: &BrokerError) {}
}
