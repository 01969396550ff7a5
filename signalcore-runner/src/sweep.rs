//! Backtest sweep driver — parameter grid × data slots.
//!
//! Every numeric parameter contributes its `start..=stop` values, the rest
//! their current value. The cartesian product of those lists is run once per
//! data slot, in a fixed order (slots ascending, then combinations with the
//! last parameter varying fastest). Each run gets a fresh simulated broker.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use signalcore_core::data::DataProvider;
use signalcore_core::domain::{AccountId, ParamSet, ScriptingParameter, Selection, TradeSignal};
use signalcore_core::sim::{CostModel, SimulatedBroker};
use tracing::{debug, info, warn};

use crate::alerts::{AlertLevel, AlertQueue};
use crate::results::{combination_id, BacktestSummary, NoProgress, ProgressSink};
use crate::stats::{DefaultStatistics, Statistics, TradeEntry};
use crate::strategy::{SlotContext, Strategy};
use crate::trade_log::encode_trade_log;

/// Largest parameter grid a sweep will enumerate.
pub const MAX_COMBINATIONS: usize = 1_000_000;

/// Cooperative pause/stop checks made at the top of every iteration.
pub trait SweepControl: Send + Sync {
    fn is_paused(&self) -> bool;
    fn is_stopped(&self) -> bool;
}

/// Never pauses, never stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uninterrupted;

impl SweepControl for Uninterrupted {
    fn is_paused(&self) -> bool {
        false
    }

    fn is_stopped(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Sleep between pause checks.
    pub pause_poll: Duration,
    pub cost_model: CostModel,
    /// Account the per-combination brokers trade under.
    pub account: AccountId,
    /// Alert source name.
    pub source: String,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            pause_poll: Duration::from_millis(50),
            cost_model: CostModel::frictionless(),
            account: AccountId::new("backtest"),
            source: "sweep".into(),
        }
    }
}

/// What a sweep produced.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub summaries: Vec<BacktestSummary>,
    /// Iterations run, including failed ones.
    pub completed: usize,
    pub failed: usize,
    /// Iterations planned: combinations × slots.
    pub total: usize,
    pub aborted: bool,
}

impl SweepReport {
    pub fn percent(&self) -> f64 {
        percent(self.completed, self.total)
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Cartesian product of every parameter's sweep values.
///
/// The result has one entry per combination; with no parameters it is a
/// single empty combination.
pub fn combinations(params: &[ScriptingParameter]) -> Vec<ParamSet> {
    let mut combos: Vec<Vec<_>> = vec![Vec::with_capacity(params.len())];
    for param in params {
        let values = param.sweep_values();
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push((param.name.clone(), v.clone()));
                    next
                })
            })
            .collect();
    }
    combos.into_iter().map(ParamSet::new).collect()
}

/// Selections grouped by data slot, slots ascending.
pub fn group_slots(selections: &[Selection]) -> BTreeMap<u32, Vec<Selection>> {
    let mut slots: BTreeMap<u32, Vec<Selection>> = BTreeMap::new();
    for sel in selections {
        slots.entry(sel.slot).or_default().push(sel.clone());
    }
    slots
}

/// Size of the parameter grid, or `None` if it overflows `usize`.
pub fn combination_count(params: &[ScriptingParameter]) -> Option<usize> {
    params
        .iter()
        .try_fold(1usize, |acc, p| acc.checked_mul(p.sweep_len()))
}

/// Number of iterations a sweep will run, saturating at `usize::MAX`.
pub fn iteration_count(params: &[ScriptingParameter], selections: &[Selection]) -> usize {
    combination_count(params)
        .and_then(|c| c.checked_mul(group_slots(selections).len()))
        .unwrap_or(usize::MAX)
}

/// Run `f`, turning both errors and panics into a message.
pub(crate) fn run_guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Parameter sweep executor.
pub struct SweepDriver<'a> {
    strategy: &'a dyn Strategy,
    data: &'a dyn DataProvider,
    statistics: &'a dyn Statistics,
    control: &'a dyn SweepControl,
    sink: &'a dyn ProgressSink,
    alerts: Option<&'a AlertQueue>,
    settings: SweepSettings,
}

impl<'a> SweepDriver<'a> {
    pub fn new(strategy: &'a dyn Strategy, data: &'a dyn DataProvider, settings: SweepSettings) -> Self {
        Self {
            strategy,
            data,
            statistics: &DefaultStatistics,
            control: &Uninterrupted,
            sink: &NoProgress,
            alerts: None,
            settings,
        }
    }

    pub fn with_statistics(mut self, statistics: &'a dyn Statistics) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_control(mut self, control: &'a dyn SweepControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_alerts(mut self, alerts: &'a AlertQueue) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Run every (slot, combination) pair.
    ///
    /// A failing or panicking iteration is reported as an alert and counted;
    /// the sweep carries on. A stop request ends the sweep with the summaries
    /// gathered so far.
    pub fn run(&self, params: &[ScriptingParameter], selections: &[Selection]) -> SweepReport {
        match combination_count(params) {
            Some(n) if n <= MAX_COMBINATIONS => {}
            n => {
                let size = n.map_or_else(|| "overflowing".to_string(), |n| n.to_string());
                self.alert(
                    AlertLevel::Error,
                    format!("sweep rejected: {size} combinations, limit is {MAX_COMBINATIONS}"),
                );
                self.sink.on_finished(true);
                return SweepReport {
                    aborted: true,
                    ..SweepReport::default()
                };
            }
        }
        let combos = combinations(params);
        let slots = group_slots(selections);
        let mut report = SweepReport {
            total: combos.len() * slots.len(),
            ..SweepReport::default()
        };
        info!(
            strategy = self.strategy.name(),
            combinations = combos.len(),
            slots = slots.len(),
            total = report.total,
            "starting sweep"
        );

        'slots: for (&slot, slot_selections) in &slots {
            let last_prices = self.last_prices(slot_selections);

            for (index, combo) in combos.iter().enumerate() {
                self.wait_while_paused();
                if self.control.is_stopped() {
                    report.aborted = true;
                    break 'slots;
                }

                let outcome = run_guarded(|| {
                    let mut broker = SimulatedBroker::with_cost_model(self.settings.cost_model);
                    let mut ctx = SlotContext {
                        slot,
                        selections: slot_selections,
                        params: combo,
                        data: self.data,
                        broker: &mut broker,
                        account: &self.settings.account,
                    };
                    self.strategy.backtest_slot_item(&mut ctx)
                });
                report.completed += 1;
                let pct = percent(report.completed, report.total);

                let new = match outcome {
                    Ok(signals) => {
                        debug!(slot, index, params = %combo, trades = signals.len(), "combination done");
                        self.summarize(slot, index, combo, slot_selections, &last_prices, signals, pct)
                    }
                    Err(msg) => {
                        report.failed += 1;
                        self.alert(
                            AlertLevel::Warning,
                            format!("slot {slot}, combination {index} ({combo}) failed: {msg}"),
                        );
                        Vec::new()
                    }
                };
                self.sink.on_progress(&new, pct);
                report.summaries.extend(new);
            }
        }

        self.sink.on_finished(report.aborted);
        info!(
            strategy = self.strategy.name(),
            completed = report.completed,
            failed = report.failed,
            aborted = report.aborted,
            "sweep finished"
        );
        report
    }

    fn wait_while_paused(&self) {
        let mut announced = false;
        while self.control.is_paused() && !self.control.is_stopped() {
            if !announced {
                info!(strategy = self.strategy.name(), "sweep paused");
                announced = true;
            }
            thread::sleep(self.settings.pause_poll);
        }
        if announced {
            info!(strategy = self.strategy.name(), "sweep resumed");
        }
    }

    /// Latest quote mid per symbol in the slot, where the provider has one.
    fn last_prices(&self, selections: &[Selection]) -> HashMap<String, f64> {
        selections
            .iter()
            .filter_map(|s| {
                self.data
                    .get_last_tick(&s.feed, &s.symbol)
                    .map(|t| (s.symbol.clone(), t.mid()))
            })
            .collect()
    }

    /// One summary per instrument: every selected symbol, plus any other
    /// instrument the strategy traded.
    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        slot: u32,
        index: usize,
        params: &ParamSet,
        selections: &[Selection],
        last_prices: &HashMap<String, f64>,
        signals: Vec<TradeSignal>,
        progress: f64,
    ) -> Vec<BacktestSummary> {
        let mut by_instrument: BTreeMap<String, Vec<TradeSignal>> = selections
            .iter()
            .map(|s| (s.symbol.clone(), Vec::new()))
            .collect();
        for signal in signals {
            by_instrument
                .entry(signal.instrument.clone())
                .or_default()
                .push(signal);
        }
        let id = combination_id(params);
        let groups: Vec<(String, Vec<TradeSignal>)> = by_instrument.into_iter().collect();

        groups
            .into_par_iter()
            .map(|(instrument, signals)| {
                let selection = selections.iter().find(|s| s.symbol == instrument);
                let trades: Vec<TradeEntry> = signals.iter().map(TradeEntry::from).collect();
                let last_price = last_prices
                    .get(&instrument)
                    .copied()
                    .or_else(|| trades.last().map(|t| t.price))
                    .unwrap_or(f64::NAN);
                let slippage = selection.map_or(0.0, |s| s.slippage);
                let stats = self.statistics.summarize(&trades, last_price, slippage);
                let trade_log = encode_trade_log(&trades).unwrap_or_else(|e| {
                    warn!(%instrument, "failed to encode trade log: {e}");
                    Vec::new()
                });
                BacktestSummary {
                    slot,
                    combination_index: index,
                    combination_id: id.clone(),
                    params: params.clone(),
                    instrument,
                    leverage: selection.map_or(1.0, |s| s.leverage),
                    stats,
                    trade_log,
                    progress,
                }
            })
            .collect()
    }

    fn alert(&self, level: AlertLevel, message: String) {
        match self.alerts {
            Some(queue) => queue.push(level, &self.settings.source, message),
            None => warn!(source = %self.settings.source, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalcore_core::domain::{ParamValue, PriceSeries, SelectionRange, Timeframe};

    fn sel(symbol: &str, slot: u32) -> Selection {
        Selection::new(symbol, "mem", Timeframe::Day, SelectionRange::BarCount { count: 10 })
            .with_slot(slot)
    }

    #[test]
    fn product_order_is_last_parameter_fastest() {
        let params = vec![
            ScriptingParameter::int("a", 1).with_sweep(1.0, 2.0, 1.0).unwrap(),
            ScriptingParameter::series("src", PriceSeries::Close),
            ScriptingParameter::double("b", 0.5).with_sweep(0.5, 1.5, 0.5).unwrap(),
        ];
        let combos = combinations(&params);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0].get_int("a"), Some(1));
        assert_eq!(combos[0].get_double("b"), Some(0.5));
        assert_eq!(combos[1].get_double("b"), Some(1.0));
        assert_eq!(combos[3].get_int("a"), Some(2));
        assert!(combos
            .iter()
            .all(|c| c.get("src") == Some(&ParamValue::Series(PriceSeries::Close))));
    }

    #[test]
    fn no_parameters_is_one_combination() {
        let combos = combinations(&[]);
        assert_eq!(combos.len(), 1);
        assert!(combos[0].values.is_empty());
    }

    #[test]
    fn slots_group_and_count() {
        let selections = vec![sel("SPY", 1), sel("QQQ", 0), sel("IWM", 1)];
        let slots = group_slots(&selections);
        assert_eq!(slots.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(slots[&1].len(), 2);

        let params = vec![ScriptingParameter::int("n", 1).with_sweep(1.0, 5.0, 1.0).unwrap()];
        assert_eq!(iteration_count(&params, &selections), 10);
        assert_eq!(iteration_count(&params, &[]), 0);
    }

    #[test]
    fn oversized_grids_are_counted_without_overflow() {
        let wide = || {
            ScriptingParameter::int("n", 0)
                .with_sweep(0.0, 99_999.0, 1.0)
                .unwrap()
        };
        assert_eq!(combination_count(&[wide(), wide()]), Some(10_000_000_000));
        let params: Vec<_> = (0..5).map(|_| wide()).collect();
        assert_eq!(combination_count(&params), None);
        assert_eq!(iteration_count(&params, &[sel("SPY", 0)]), usize::MAX);
    }

    #[test]
    fn guarded_run_catches_panics() {
        let ok: Result<i32, String> = run_guarded(|| Ok(3));
        assert_eq!(ok, Ok(3));
        let err = run_guarded::<()>(|| anyhow::bail!("bad input"));
        assert_eq!(err, Err("bad input".to_string()));
        let panicked = run_guarded::<()>(|| panic!("kaboom"));
        assert!(panicked.unwrap_err().contains("kaboom"));
    }

    #[test]
    fn percent_of_empty_sweep_is_complete() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
