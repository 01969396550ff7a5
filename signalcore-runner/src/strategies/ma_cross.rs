//! Moving average crossover strategy.
//!
//! - Go long when the fast SMA of closes crosses above the slow SMA
//! - Go short when it crosses below
//! - Crosses against an open position flip it in a single order

use std::collections::HashMap;

use parking_lot::Mutex;
use signalcore_core::domain::{
    OrderParams, OrderSide, ParamSet, ScriptingParameter, TradeSignal,
};

use crate::signal::Signal;
use crate::strategy::{SlotContext, StartTrigger, Strategy, StrategyEvent};

pub const NAME: &str = "ma_cross";

/// Resolved parameter values for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Setup {
    fast: usize,
    slow: usize,
    quantity: f64,
    /// Stop-loss offset; `None` for no stop.
    stop_loss: Option<f64>,
}

impl Setup {
    /// `None` if the values cannot produce a crossover (fast must be below slow).
    fn from_params(params: &ParamSet) -> Option<Self> {
        let fast = params.get_int("fast")?;
        let slow = params.get_int("slow")?;
        let quantity = params.get_double("quantity")?;
        if fast <= 0 || fast >= slow || quantity <= 0.0 {
            return None;
        }
        let stop_loss = params.get_double("stop_loss").filter(|sl| *sl > 0.0);
        Some(Self {
            fast: fast as usize,
            slow: slow as usize,
            quantity,
            stop_loss,
        })
    }

    /// Order reaching `side` from the current signed position, or `None` if
    /// already positioned that way.
    fn entry(&self, symbol: &str, side: OrderSide, signed_position: f64) -> Option<OrderParams> {
        let held = side.sign() * signed_position;
        if held > 0.0 {
            return None;
        }
        let mut params = OrderParams::market(symbol, side, self.quantity + held.abs());
        if let Some(sl) = self.stop_loss {
            params = params.with_stop_loss(sl);
        }
        Some(params)
    }
}

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let recent = &values[values.len() - period..];
    Some(recent.iter().sum::<f64>() / period as f64)
}

/// Crossover on the latest value: `Buy` for a bullish cross, `Sell` for bearish.
pub fn crossing(closes: &[f64], fast: usize, slow: usize) -> Option<OrderSide> {
    if closes.len() < slow + 1 {
        return None;
    }
    let prev = &closes[..closes.len() - 1];
    let fast_now = sma(closes, fast)?;
    let slow_now = sma(closes, slow)?;
    let fast_prev = sma(prev, fast)?;
    let slow_prev = sma(prev, slow)?;

    if fast_prev <= slow_prev && fast_now > slow_now {
        Some(OrderSide::Buy)
    } else if fast_prev >= slow_prev && fast_now < slow_now {
        Some(OrderSide::Sell)
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct MaCrossStrategy {
    /// Recent closes per symbol while running live or simulated.
    closes: Mutex<HashMap<String, Vec<f64>>>,
}

impl MaCrossStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for MaCrossStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> Vec<ScriptingParameter> {
        vec![
            ScriptingParameter::int("fast", 10).with_description("fast SMA period"),
            ScriptingParameter::int("slow", 30).with_description("slow SMA period"),
            ScriptingParameter::double("quantity", 1.0),
            ScriptingParameter::double("stop_loss", 0.0)
                .with_description("stop-loss offset from entry, 0 for none"),
        ]
    }

    fn internal_init(&self, _signal: &Signal) -> anyhow::Result<()> {
        self.closes.lock().clear();
        Ok(())
    }

    fn internal_start(
        &self,
        signal: &Signal,
        _trigger: StartTrigger,
        events: &[StrategyEvent],
    ) -> anyhow::Result<()> {
        let params = ParamSet::current(&signal.get_parameters());
        let Some(setup) = Setup::from_params(&params) else {
            return Ok(());
        };

        for event in events {
            let StrategyEvent::Bar(bar) = event else {
                continue;
            };
            let side = {
                let mut closes = self.closes.lock();
                let series = closes.entry(bar.symbol.clone()).or_default();
                series.push(bar.close_mid());
                if series.len() > setup.slow + 1 {
                    series.remove(0);
                }
                crossing(series, setup.fast, setup.slow)
            };
            let Some(side) = side else {
                continue;
            };
            let held = signal
                .get_positions()
                .iter()
                .find(|p| p.symbol == bar.symbol)
                .map_or(0.0, |p| p.signed_quantity());
            if let Some(order) = setup.entry(&bar.symbol, side, held) {
                signal.place_order(order);
            }
        }
        Ok(())
    }

    fn backtest_slot_item(&self, ctx: &mut SlotContext<'_>) -> anyhow::Result<Vec<TradeSignal>> {
        let Some(setup) = Setup::from_params(ctx.params) else {
            return Ok(Vec::new());
        };
        let selections = ctx.selections;
        let mut signals = Vec::new();

        for selection in selections {
            let bars = ctx.data.get_bars(selection)?;
            let mut closes = Vec::with_capacity(bars.len());
            let fills = ctx.replay(&bars, |step| {
                closes.push(step.bar().close_mid());
                if let Some(side) = crossing(&closes, setup.fast, setup.slow) {
                    let held = step.position().map_or(0.0, |p| p.signed_quantity());
                    if let Some(order) = setup.entry(&selection.symbol, side, held) {
                        step.place(order)?;
                    }
                }
                Ok(())
            })?;
            signals.extend(fills);
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalcore_core::domain::ParamValue;

    fn params(fast: i64, slow: i64) -> ParamSet {
        ParamSet::new(vec![
            ("fast".into(), ParamValue::Int(fast)),
            ("slow".into(), ParamValue::Int(slow)),
            ("quantity".into(), ParamValue::Double(2.0)),
            ("stop_loss".into(), ParamValue::Double(0.0)),
        ])
    }

    #[test]
    fn sma_basic() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0], 2), None);
        assert_eq!(sma(&[1.0], 0), None);
    }

    #[test]
    fn detects_bullish_and_bearish_cross() {
        // fast(2) moves from below slow(3) to above on the last value.
        assert_eq!(crossing(&[5.0, 4.0, 3.0, 6.0], 2, 3), Some(OrderSide::Buy));
        assert_eq!(crossing(&[1.0, 2.0, 3.0, 0.0], 2, 3), Some(OrderSide::Sell));
        assert_eq!(crossing(&[1.0, 2.0, 3.0, 4.0], 2, 3), None);
        assert_eq!(crossing(&[1.0, 2.0, 3.0], 2, 3), None);
    }

    #[test]
    fn invalid_setup_rejected() {
        assert!(Setup::from_params(&params(10, 10)).is_none());
        assert!(Setup::from_params(&params(0, 10)).is_none());
        let setup = Setup::from_params(&params(2, 5)).unwrap();
        assert_eq!(setup.stop_loss, None);
    }

    #[test]
    fn entry_flips_opposite_position() {
        let setup = Setup::from_params(&params(2, 5)).unwrap();
        let flip = setup.entry("SPY", OrderSide::Sell, 2.0).unwrap();
        assert_eq!(flip.quantity, 4.0);
        assert!(setup.entry("SPY", OrderSide::Buy, 2.0).is_none());
        assert_eq!(setup.entry("SPY", OrderSide::Buy, 0.0).unwrap().quantity, 2.0);
    }
}
