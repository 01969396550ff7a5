//! Property tests for simulator invariants.
//!
//! Uses proptest to verify:
//! 1. Net position: the signed position always equals the signed sum of fills
//! 2. Order accounting: filled + cancelled never exceeds order quantity
//! 3. Tick synthesis: four ticks, first is the open, last is the close
//! 4. Sweep ranges: value count matches the closed-form count

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use signalcore_core::domain::{AccountId, Bar, OrderParams, OrderSide, SweepRange};
use signalcore_core::sim::{synthesize_ticks, SimulatedBroker, TICKS_PER_BAR};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_quantity() -> impl Strategy<Value = f64> {
    (1u32..50).prop_map(f64::from)
}

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_side() -> impl Strategy<Value = OrderSide> {
    prop_oneof![Just(OrderSide::Buy), Just(OrderSide::Sell)]
}

fn arb_bar() -> impl Strategy<Value = Bar> {
    (arb_price(), 0.0..5.0_f64, 0.0..5.0_f64, -5.0..5.0_f64, 0.0..0.5_f64).prop_map(
        |(open, up, down, drift, spread)| {
            let close = (open + drift).clamp(open - down, open + up);
            let t = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
            Bar::from_mid("SPY", t, open, open + up, open - down, close, 1000.0, spread)
        },
    )
}

fn bar_at(i: usize, price: f64) -> Bar {
    let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::days(i as i64);
    Bar::from_mid("SPY", t, price, price + 1.0, price - 1.0, price, 1000.0, 0.02)
}

// ── 1. Net Position ──────────────────────────────────────────────────

proptest! {
    /// Market orders only: the open position is exactly the net of all fills.
    #[test]
    fn position_is_net_of_fills(
        orders in prop::collection::vec((arb_side(), arb_quantity(), arb_price()), 1..20)
    ) {
        let acct = AccountId::new("acct");
        let mut broker = SimulatedBroker::new();
        for (i, (side, qty, price)) in orders.iter().enumerate() {
            broker.place_order(&acct, OrderParams::market("SPY", *side, *qty)).unwrap();
            broker.process_bar("SPY", &bar_at(i, *price));
        }

        let net: f64 = broker.fills().iter().map(|f| f.side.sign() * f.quantity).sum();
        let positions = broker.positions(&acct);
        prop_assert!(positions.len() <= 1);
        match positions.first() {
            Some(pos) => {
                prop_assert!(pos.quantity > 0.0);
                prop_assert!((pos.signed_quantity() - net).abs() < 1e-9);
            }
            None => prop_assert!(net.abs() < 1e-9),
        }
    }
}

// ── 2. Order Accounting ──────────────────────────────────────────────

proptest! {
    /// With protection attached, no order ever over-fills or over-cancels.
    #[test]
    fn orders_never_exceed_quantity(
        entries in prop::collection::vec((arb_side(), arb_quantity()), 1..10),
        bars in prop::collection::vec(arb_bar(), 1..20),
    ) {
        let acct = AccountId::new("acct");
        let mut broker = SimulatedBroker::new();
        for (i, bar) in bars.iter().enumerate() {
            if let Some((side, qty)) = entries.get(i) {
                let params = OrderParams::market("SPY", *side, *qty)
                    .with_stop_loss(1.0)
                    .with_take_profit(2.0);
                broker.place_order(&acct, params).unwrap();
            }
            let mut bar = bar.clone();
            bar.time += Duration::days(i as i64);
            broker.process_bar("SPY", &bar);
        }

        for order in broker.order_history().iter().chain(broker.open_orders(&acct).iter()) {
            prop_assert!(order.filled_quantity + order.cancelled_quantity <= order.quantity + 1e-9);
        }
        // Protective orders are sized to the position they protect.
        if let Some(pos) = broker.position(&acct, "SPY") {
            for order in broker.open_orders(&acct).iter().filter(|o| o.is_protective()) {
                prop_assert!((order.quantity - pos.quantity).abs() < 1e-9);
                prop_assert_eq!(order.side, pos.side.opposite());
            }
        }
    }
}

// ── 3. Tick Synthesis ────────────────────────────────────────────────

proptest! {
    #[test]
    fn ticks_span_open_to_close(bar in arb_bar()) {
        let ticks = synthesize_ticks(&bar);
        prop_assert_eq!(ticks.len(), TICKS_PER_BAR);
        prop_assert_eq!(ticks[0].bid, bar.open_bid);
        prop_assert_eq!(ticks[TICKS_PER_BAR - 1].ask, bar.close_ask);
        for t in &ticks {
            prop_assert!(t.bid >= bar.low_bid - 1e-9 && t.bid <= bar.high_bid + 1e-9);
            prop_assert_eq!(t.time, bar.time);
        }
    }
}

// ── 4. Sweep Ranges ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn sweep_count_matches_formula(start in 0i32..50, span in 0i32..100, step in 1i32..10) {
        let (start, stop, step) = (start as f64, (start + span) as f64, step as f64);
        let range = SweepRange::new(start, stop, step);
        let expected = ((stop - start) / step).floor() as usize + 1;
        prop_assert_eq!(range.len(), expected);
        let values = range.values();
        prop_assert_eq!(values.len(), expected);
        prop_assert!(values.iter().all(|v| *v <= stop + 1e-9));
    }
}
