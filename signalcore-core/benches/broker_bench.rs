//! Criterion benchmarks for simulator hot paths.
//!
//! Benchmarks:
//! 1. Tick synthesis
//! 2. process_bar with a working book and protective orders
//! 3. A full bar-by-bar run with periodic entries

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use signalcore_core::domain::{AccountId, Bar, OrderParams, OrderSide};
use signalcore_core::sim::{synthesize_ticks, SimulatedBroker};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar::from_mid(
                "SPY",
                t0 + Duration::days(i as i64),
                open,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000.0,
                0.02,
            )
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_tick_synthesis(c: &mut Criterion) {
    let bars = make_bars(1);
    c.bench_function("synthesize_ticks", |b| {
        b.iter(|| synthesize_ticks(black_box(&bars[0])))
    });
}

fn bench_process_bar(c: &mut Criterion) {
    let acct = AccountId::new("bench");
    let bars = make_bars(2);
    let mut group = c.benchmark_group("process_bar");

    for resting in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(resting), &resting, |b, &n| {
            b.iter_batched(
                || {
                    let mut broker = SimulatedBroker::new();
                    broker
                        .place_order(
                            &acct,
                            OrderParams::market("SPY", OrderSide::Buy, 10.0)
                                .with_stop_loss(5.0)
                                .with_take_profit(5.0),
                        )
                        .ok();
                    broker.process_bar("SPY", &bars[0]);
                    for i in 0..n {
                        let level = 50.0 - (i % 40) as f64;
                        broker
                            .place_order(&acct, OrderParams::limit("SPY", OrderSide::Buy, 1.0, level))
                            .ok();
                    }
                    broker
                },
                |mut broker| broker.process_bar("SPY", black_box(&bars[1])),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_bar_loop(c: &mut Criterion) {
    let acct = AccountId::new("bench");
    let bars = make_bars(2520);
    c.bench_function("bar_loop_10y", |b| {
        b.iter(|| {
            let mut broker = SimulatedBroker::new();
            for (i, bar) in bars.iter().enumerate() {
                if i % 20 == 0 {
                    let side = if (i / 20) % 2 == 0 { OrderSide::Buy } else { OrderSide::Sell };
                    broker
                        .place_order(&acct, OrderParams::market("SPY", side, 10.0).with_stop_loss(3.0))
                        .ok();
                }
                broker.process_bar("SPY", bar);
            }
            black_box(broker.fills().len())
        })
    });
}

criterion_group!(benches, bench_tick_synthesis, bench_process_bar, bench_bar_loop);
criterion_main!(benches);
