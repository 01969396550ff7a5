//! Tick synthesis — expand one bar into a four-tick intrabar path.
//!
//! Path: open → first extreme → second extreme → close. A bar that closed at
//! or above its open is assumed to have visited the low first; otherwise the
//! high. This is an approximation of the real intrabar path and can produce
//! different fills than an exchange would for the same bar.

use crate::domain::{Bar, Tick};

/// Number of ticks produced per bar.
pub const TICKS_PER_BAR: usize = 4;

/// Expand `bar` into exactly four ticks in chronological order.
///
/// Each tick carries one eighth of the bar's combined bid+ask volume. The
/// shape is kept even for flat bars (high == low == open == close), which
/// yield four identical ticks.
pub fn synthesize_ticks(bar: &Bar) -> [Tick; TICKS_PER_BAR] {
    let size = bar.total_volume() / 8.0;
    let open = Tick::new(bar.time, bar.open_bid, bar.open_ask, size);
    let low = Tick::new(bar.time, bar.low_bid, bar.low_ask, size);
    let high = Tick::new(bar.time, bar.high_bid, bar.high_ask, size);
    let close = Tick::new(bar.time, bar.close_bid, bar.close_ask, size);

    if bar.closed_up() {
        [open, low, high, close]
    } else {
        [open, high, low, close]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[allow(clippy::too_many_arguments)]
    fn quote_bar(
        open: (f64, f64),
        high: (f64, f64),
        low: (f64, f64),
        close: (f64, f64),
        bid_volume: f64,
        ask_volume: f64,
    ) -> Bar {
        Bar {
            symbol: "EURUSD".into(),
            time: Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
            open_ask: open.0,
            open_bid: open.1,
            high_ask: high.0,
            high_bid: high.1,
            low_ask: low.0,
            low_bid: low.1,
            close_ask: close.0,
            close_bid: close.1,
            bid_volume,
            ask_volume,
        }
    }

    fn quotes(ticks: &[Tick]) -> Vec<(f64, f64)> {
        ticks.iter().map(|t| (t.ask, t.bid)).collect()
    }

    #[test]
    fn up_bar_visits_low_then_high() {
        // low == open, high == close
        let bar = quote_bar(
            (1.10, 1.08),
            (1.12, 1.10),
            (1.10, 1.08),
            (1.12, 1.10),
            40.0,
            40.0,
        );
        let ticks = synthesize_ticks(&bar);
        assert_eq!(
            quotes(&ticks),
            vec![(1.10, 1.08), (1.10, 1.08), (1.12, 1.10), (1.12, 1.10)]
        );
        assert!(ticks.iter().all(|t| t.size == 10.0));
    }

    #[test]
    fn down_bar_visits_high_then_low() {
        let bar = quote_bar(
            (1.11, 1.10),
            (1.13, 1.12),
            (1.07, 1.06),
            (1.08, 1.07),
            8.0,
            0.0,
        );
        let ticks = synthesize_ticks(&bar);
        assert_eq!(
            quotes(&ticks),
            vec![(1.11, 1.10), (1.13, 1.12), (1.07, 1.06), (1.08, 1.07)]
        );
        assert_eq!(ticks[0].size, 1.0);
    }

    #[test]
    fn flat_bar_keeps_four_ticks() {
        let q = (1.0, 1.0);
        let bar = quote_bar(q, q, q, q, 0.0, 0.0);
        let ticks = synthesize_ticks(&bar);
        assert_eq!(ticks.len(), TICKS_PER_BAR);
        assert!(ticks.iter().all(|t| t.bid == 1.0 && t.ask == 1.0 && t.size == 0.0));
    }
}
