//! Scenario tests for the simulated broker: multi-bar flows with a real spread.

use chrono::{DateTime, Duration, TimeZone, Utc};
use signalcore_core::domain::{
    AccountId, Bar, OrderParams, OrderSide, OrderStatus, OrderType, PositionKey, ProtectiveKind,
};
use signalcore_core::sim::{ActivityKind, CostModel, SimulatedBroker};
use signalcore_core::{Broker, BrokerError, ModifyOrder};

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap() + Duration::days(n)
}

fn acct() -> AccountId {
    AccountId::new("paper-1")
}

/// Bar with a 0.2 spread around the given mids.
fn bar(n: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::from_mid("EURUSD", day(n), open, high, low, close, 400.0, 0.2)
}

#[test]
fn buys_fill_on_ask_and_sells_on_bid() {
    let mut broker = SimulatedBroker::new();
    broker
        .place_order(&acct(), OrderParams::market("EURUSD", OrderSide::Buy, 1.0))
        .unwrap();
    let buy = broker.process_bar("EURUSD", &bar(0, 100.0, 101.0, 99.0, 100.5));
    assert!((buy[0].price - 100.1).abs() < 1e-9);

    broker
        .place_order(&acct(), OrderParams::market("EURUSD", OrderSide::Sell, 1.0))
        .unwrap();
    let sell = broker.process_bar("EURUSD", &bar(1, 100.0, 101.0, 99.0, 100.5));
    assert!((sell[0].price - 99.9).abs() < 1e-9);
    assert!(broker.position(&acct(), "EURUSD").is_none());
}

#[test]
fn short_with_protection_stopped_out_on_ask() {
    let mut broker = SimulatedBroker::new();
    broker
        .place_order(
            &acct(),
            OrderParams::market("EURUSD", OrderSide::Sell, 2.0)
                .with_stop_loss(1.0)
                .with_take_profit(3.0),
        )
        .unwrap();
    broker.process_bar("EURUSD", &bar(0, 100.0, 100.0, 100.0, 100.0));

    let pos = broker.position(&acct(), "EURUSD").unwrap().clone();
    assert_eq!(pos.side, OrderSide::Sell);
    assert!((pos.avg_entry_price - 99.9).abs() < 1e-9);

    let key = PositionKey::new(acct(), "EURUSD");
    let sl = broker
        .orders_for(&key)
        .iter()
        .find(|o| o.protective == Some(ProtectiveKind::StopLoss))
        .unwrap()
        .clone();
    assert_eq!(sl.side, OrderSide::Buy);
    match sl.order_type {
        OrderType::Stop { stop_price } => assert!((stop_price - 100.9).abs() < 1e-9),
        other => panic!("expected stop, got {other:?}"),
    }

    // Up bar: ask reaches 101.1 at the high tick.
    let fills = broker.process_bar("EURUSD", &bar(1, 100.2, 101.0, 100.1, 100.8));
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].protective, Some(ProtectiveKind::StopLoss));
    assert!((fills[0].price - 101.1).abs() < 1e-9);
    assert!(broker.position(&acct(), "EURUSD").is_none());
    assert!(broker.orders_for(&key).is_empty());
}

#[test]
fn activity_log_tracks_lifecycle() {
    let mut broker = SimulatedBroker::new();
    broker
        .place_order(
            &acct(),
            OrderParams::market("EURUSD", OrderSide::Buy, 1.0).with_take_profit(0.5),
        )
        .unwrap();
    broker.process_bar("EURUSD", &bar(0, 100.0, 100.0, 100.0, 100.0));
    broker.process_bar("EURUSD", &bar(1, 100.0, 101.0, 99.5, 100.9));

    let kinds: Vec<ActivityKind> = broker.activity().entries().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::OrderPlaced,
            ActivityKind::OrderFilled,
            ActivityKind::PositionCreated,
            ActivityKind::OrderPlaced,
            ActivityKind::OrderFilled,
            ActivityKind::PositionClosed,
        ]
    );
}

#[test]
fn commission_reduces_average_and_fill_signals_mirror_fills() {
    let mut broker = SimulatedBroker::with_cost_model(CostModel::new(0.0, 10.0));
    for n in 0..2 {
        broker
            .place_order(&acct(), OrderParams::market("EURUSD", OrderSide::Buy, 5.0))
            .unwrap();
        broker.process_bar("EURUSD", &bar(n, 100.0, 100.0, 100.0, 100.0));
    }
    let pos = broker.position(&acct(), "EURUSD").unwrap();
    assert!(pos.avg_entry_price < 100.1);

    let signals = broker.fill_signals();
    assert_eq!(signals.len(), 2);
    assert!(signals.iter().all(|s| s.side == OrderSide::Buy && s.quantity == 5.0));
    assert_eq!(signals[1].time, day(1));
}

#[test]
fn order_placed_during_bar_waits_for_next_bar() {
    let mut broker = SimulatedBroker::new();
    let first = broker.process_bar("EURUSD", &bar(0, 100.0, 100.0, 100.0, 100.0));
    assert!(first.is_empty());

    let order = broker
        .place_order(&acct(), OrderParams::stop("EURUSD", OrderSide::Buy, 1.0, 100.5))
        .unwrap();
    assert_eq!(order.placed_at, day(0));

    let fills = broker.process_bar("EURUSD", &bar(1, 100.0, 101.0, 99.0, 100.0));
    assert_eq!(fills.len(), 1);
    assert_eq!(
        broker.get_order(order.id).unwrap().status,
        OrderStatus::Filled
    );
}

#[test]
fn other_symbols_are_untouched() {
    let mut broker = SimulatedBroker::new();
    broker
        .place_order(&acct(), OrderParams::market("GBPUSD", OrderSide::Buy, 1.0))
        .unwrap();
    assert!(broker
        .process_bar("EURUSD", &bar(0, 100.0, 100.0, 100.0, 100.0))
        .is_empty());
    assert_eq!(broker.open_orders(&acct()).len(), 1);
}

#[test]
fn modify_regular_order_in_place() {
    let mut broker = SimulatedBroker::new();
    let order = broker
        .place_order(&acct(), OrderParams::limit("EURUSD", OrderSide::Buy, 1.0, 95.0))
        .unwrap();
    let changed = broker
        .modify_order(
            &acct(),
            order.id,
            &ModifyOrder {
                quantity: Some(3.0),
                price: Some(96.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(changed.id, order.id);
    assert_eq!(changed.quantity, 3.0);
    assert_eq!(changed.order_type, OrderType::Limit { limit_price: 96.0 });

    let err = broker
        .modify_order(
            &acct(),
            order.id,
            &ModifyOrder {
                price: Some(f64::NAN),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidPrice(_)));
}

#[test]
fn shared_broker_through_trait() {
    let shared = std::sync::Arc::new(parking_lot::Mutex::new(SimulatedBroker::new()));
    let broker: std::sync::Arc<dyn Broker> = shared.clone();

    let order = broker
        .place_order(&acct(), OrderParams::market("EURUSD", OrderSide::Buy, 2.0))
        .unwrap();
    shared
        .lock()
        .process_bar("EURUSD", &bar(0, 100.0, 100.0, 100.0, 100.0));
    assert_eq!(
        broker.get_order(&acct(), order.id).unwrap().unwrap().status,
        OrderStatus::Filled
    );

    let closes = broker.close_all_positions(&acct()).unwrap();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].side, OrderSide::Sell);
    assert_eq!(
        broker.cancel_order(&acct(), order.id),
        Err(BrokerError::OrderNotOpen(order.id))
    );
}
