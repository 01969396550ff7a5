//! Bar-by-bar replay through a simulated broker.

use signalcore_core::broker::BrokerError;
use signalcore_core::domain::{AccountId, Bar, Order, OrderParams, Position, TradeSignal};
use signalcore_core::sim::{CostModel, SimulatedBroker};

/// State handed to the per-bar decision closure.
pub struct BarStep<'a> {
    pub index: usize,
    /// Bars up to and including the current one.
    pub history: &'a [Bar],
    pub broker: &'a mut SimulatedBroker,
    pub account: &'a AccountId,
}

impl BarStep<'_> {
    pub fn bar(&self) -> &Bar {
        &self.history[self.index]
    }

    pub fn position(&self) -> Option<&Position> {
        self.broker.position(self.account, &self.bar().symbol)
    }

    /// Place an order; it is matched from the next bar on.
    pub fn place(&mut self, params: OrderParams) -> Result<Order, BrokerError> {
        self.broker.place_order(self.account, params)
    }

    /// Flatten the current symbol's position at the next bar.
    pub fn close(&mut self) -> Option<Order> {
        let symbol = self.bar().symbol.clone();
        self.broker.close_position(self.account, &symbol)
    }
}

/// Match each bar, then let `on_bar` react to it. Orders placed in `on_bar`
/// are evaluated against the following bar.
pub fn replay_bars<F>(
    broker: &mut SimulatedBroker,
    account: &AccountId,
    bars: &[Bar],
    mut on_bar: F,
) -> anyhow::Result<Vec<TradeSignal>>
where
    F: FnMut(&mut BarStep<'_>) -> anyhow::Result<()>,
{
    let start = broker.fills().len();
    for (index, bar) in bars.iter().enumerate() {
        broker.process_bar(&bar.symbol, bar);
        let mut step = BarStep {
            index,
            history: &bars[..=index],
            broker: &mut *broker,
            account,
        };
        on_bar(&mut step)?;
    }
    // Only this replay's fills; the broker may have been driven before.
    Ok(broker.fill_signals().split_off(start))
}

/// Owns a fresh broker and replays bar sequences through it.
#[derive(Debug, Clone)]
pub struct SimulatedReplay {
    account: AccountId,
    broker: SimulatedBroker,
}

impl SimulatedReplay {
    pub fn new(account: AccountId, cost_model: CostModel) -> Self {
        Self {
            account,
            broker: SimulatedBroker::with_cost_model(cost_model),
        }
    }

    pub fn run<F>(&mut self, bars: &[Bar], on_bar: F) -> anyhow::Result<Vec<TradeSignal>>
    where
        F: FnMut(&mut BarStep<'_>) -> anyhow::Result<()>,
    {
        replay_bars(&mut self.broker, &self.account, bars, on_bar)
    }

    pub fn broker(&self) -> &SimulatedBroker {
        &self.broker
    }

    pub fn into_broker(self) -> SimulatedBroker {
        self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use signalcore_core::domain::OrderSide;

    fn bars() -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..5)
            .map(|i| {
                let px = 100.0 + i as f64;
                Bar::from_mid("SPY", t0 + Duration::days(i), px, px, px, px, 10.0, 0.0)
            })
            .collect()
    }

    #[test]
    fn decisions_fill_on_next_bar() {
        let mut replay = SimulatedReplay::new(AccountId::new("bt"), CostModel::frictionless());
        let signals = replay
            .run(&bars(), |step| {
                match step.index {
                    0 => {
                        step.place(OrderParams::market("SPY", OrderSide::Buy, 2.0))?;
                    }
                    3 => {
                        assert!(step.position().is_some());
                        step.close();
                    }
                    _ => {}
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].price, 101.0);
        assert_eq!(signals[1].side, OrderSide::Sell);
        assert_eq!(signals[1].price, 104.0);
        assert!(replay.broker().position(&AccountId::new("bt"), "SPY").is_none());
    }

    #[test]
    fn closure_error_stops_replay() {
        let mut replay = SimulatedReplay::new(AccountId::new("bt"), CostModel::frictionless());
        let mut seen = 0;
        let err = replay.run(&bars(), |step| {
            seen += 1;
            anyhow::ensure!(step.index < 2, "boom at {}", step.index);
            Ok(())
        });
        assert!(err.is_err());
        assert_eq!(seen, 3);
    }

    #[test]
    fn second_run_returns_only_its_own_fills() {
        let mut replay = SimulatedReplay::new(AccountId::new("bt"), CostModel::frictionless());
        let buy_first = |step: &mut BarStep<'_>| -> anyhow::Result<()> {
            if step.index == 0 {
                step.place(OrderParams::market("SPY", OrderSide::Buy, 1.0))?;
            }
            Ok(())
        };
        assert_eq!(replay.run(&bars(), buy_first).unwrap().len(), 1);
        let again = replay.run(&bars(), buy_first).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(replay.broker().fills().len(), 2);
    }
}
