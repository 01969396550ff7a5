//! Trade statistics — turns a trade sequence into summary figures.
//!
//! The sweep driver only depends on the [`Statistics`] trait. [`DefaultStatistics`]
//! is a plain implementation: net-position accounting over the trade list, one
//! realized P&L per reducing trade, and ratios computed over those per-trade
//! results. No capital base is assumed, so drawdown is in price × quantity units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalcore_core::domain::{OrderSide, TradeSignal};

const QTY_EPSILON: f64 = 1e-9;

/// One executed trade as seen by the statistics function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
}

impl From<&TradeSignal> for TradeEntry {
    fn from(signal: &TradeSignal) -> Self {
        Self {
            time: signal.time,
            side: signal.side,
            price: signal.price,
            quantity: signal.quantity,
        }
    }
}

/// Aggregates for one trade sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trade_count: usize,
    /// Trades that reduced or closed exposure.
    pub closing_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Realized P&L plus the open position marked at the last price.
    pub net_profit: f64,
    pub open_profit: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub profit_factor: f64,
    pub win_rate: f64,
    /// Total slippage charged across all trades.
    pub slippage_cost: f64,
}

/// The statistics collaborator used to populate backtest summaries.
pub trait Statistics: Send + Sync {
    /// Summarize `trades` (in execution order). `slippage` is charged per unit
    /// on every trade; `last_price` marks whatever position is left open.
    fn summarize(&self, trades: &[TradeEntry], last_price: f64, slippage: f64) -> TradeStats;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatistics;

impl Statistics for DefaultStatistics {
    fn summarize(&self, trades: &[TradeEntry], last_price: f64, slippage: f64) -> TradeStats {
        let mut qty = 0.0_f64; // signed
        let mut avg = 0.0_f64;
        let mut realized: Vec<f64> = Vec::new();
        let mut slippage_cost = 0.0;

        for t in trades {
            let price = match t.side {
                OrderSide::Buy => t.price + slippage,
                OrderSide::Sell => t.price - slippage,
            };
            slippage_cost += slippage * t.quantity;
            let signed = t.side.sign() * t.quantity;

            if qty.abs() < QTY_EPSILON || qty.signum() == signed.signum() {
                let total = qty.abs() + t.quantity;
                avg = (qty.abs() * avg + t.quantity * price) / total;
                qty += signed;
                continue;
            }

            let closed = t.quantity.min(qty.abs());
            realized.push(closed * (price - avg) * qty.signum());
            let leftover = t.quantity - closed;
            qty += signed;
            if qty.abs() < QTY_EPSILON {
                qty = 0.0;
            }
            if leftover > QTY_EPSILON {
                avg = price;
            }
        }

        let open_profit = if qty != 0.0 && last_price.is_finite() {
            qty * (last_price - avg)
        } else {
            0.0
        };
        let gross_profit: f64 = realized.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = realized.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
        let wins = realized.iter().filter(|p| **p > 0.0).count();
        let losses = realized.iter().filter(|p| **p < 0.0).count();

        TradeStats {
            trade_count: trades.len(),
            closing_trades: realized.len(),
            wins,
            losses,
            gross_profit,
            gross_loss,
            net_profit: realized.iter().sum::<f64>() + open_profit,
            open_profit,
            max_drawdown: max_drawdown(&equity_curve(&realized)),
            sharpe: sharpe_ratio(&realized),
            sortino: sortino_ratio(&realized),
            profit_factor: profit_factor(gross_profit, gross_loss),
            win_rate: if realized.is_empty() {
                0.0
            } else {
                wins as f64 / realized.len() as f64
            },
            slippage_cost,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Cumulative realized P&L, starting from zero.
pub fn equity_curve(pnls: &[f64]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(pnls.iter().scan(0.0, |acc, p| {
            *acc += p;
            Some(*acc)
        }))
        .collect()
}

/// Largest peak-to-trough fall of an absolute equity curve, as a positive amount.
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in curve {
        peak = peak.max(eq);
        max_dd = max_dd.max(peak - eq);
    }
    max_dd
}

/// Per-trade Sharpe: mean / sample std. Zero with fewer than two trades or no variance.
pub fn sharpe_ratio(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let std = std_dev(pnls);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(pnls) / std
}

/// Per-trade Sortino: mean / downside deviation. Zero when nothing lost.
pub fn sortino_ratio(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p * p).sum();
    if downside_sq <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / pnls.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(pnls) / downside_std
}

/// Gross profit over gross loss, capped at 100.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(side: OrderSide, price: f64, qty: f64) -> TradeEntry {
        TradeEntry {
            time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            side,
            price,
            quantity: qty,
        }
    }

    #[test]
    fn round_trip_win_and_loss() {
        let trades = vec![
            t(OrderSide::Buy, 100.0, 10.0),
            t(OrderSide::Sell, 105.0, 10.0),
            t(OrderSide::Sell, 105.0, 5.0),
            t(OrderSide::Buy, 107.0, 5.0),
        ];
        let s = DefaultStatistics.summarize(&trades, 107.0, 0.0);
        assert_eq!(s.trade_count, 4);
        assert_eq!(s.closing_trades, 2);
        assert_eq!(s.wins, 1);
        assert_eq!(s.losses, 1);
        assert!((s.gross_profit - 50.0).abs() < 1e-10);
        assert!((s.gross_loss - 10.0).abs() < 1e-10);
        assert!((s.net_profit - 40.0).abs() < 1e-10);
        assert!((s.profit_factor - 5.0).abs() < 1e-10);
        assert!((s.max_drawdown - 10.0).abs() < 1e-10);
        assert_eq!(s.open_profit, 0.0);
    }

    #[test]
    fn open_position_marked_at_last_price() {
        let trades = vec![t(OrderSide::Buy, 100.0, 10.0), t(OrderSide::Buy, 106.0, 5.0)];
        let s = DefaultStatistics.summarize(&trades, 110.0, 0.0);
        // avg 102, 15 units
        assert!((s.open_profit - 120.0).abs() < 1e-10);
        assert!((s.net_profit - 120.0).abs() < 1e-10);
        assert_eq!(s.closing_trades, 0);
    }

    #[test]
    fn flip_reopens_at_trade_price() {
        let trades = vec![t(OrderSide::Buy, 100.0, 10.0), t(OrderSide::Sell, 110.0, 15.0)];
        let s = DefaultStatistics.summarize(&trades, 100.0, 0.0);
        assert!((s.gross_profit - 100.0).abs() < 1e-10);
        // short 5 from 110, marked at 100
        assert!((s.open_profit - 50.0).abs() < 1e-10);
    }

    #[test]
    fn slippage_is_charged_per_unit() {
        let trades = vec![t(OrderSide::Buy, 100.0, 10.0), t(OrderSide::Sell, 100.0, 10.0)];
        let s = DefaultStatistics.summarize(&trades, 100.0, 0.5);
        assert!((s.slippage_cost - 10.0).abs() < 1e-10);
        assert!((s.net_profit + 10.0).abs() < 1e-10);
        assert_eq!(s.losses, 1);
    }

    #[test]
    fn empty_sequence() {
        let s = DefaultStatistics.summarize(&[], f64::NAN, 0.0);
        assert_eq!(s, TradeStats::default());
    }

    #[test]
    fn ratio_edge_cases() {
        assert_eq!(sharpe_ratio(&[5.0]), 0.0);
        assert_eq!(sharpe_ratio(&[5.0, 5.0]), 0.0);
        assert_eq!(sortino_ratio(&[1.0, 2.0]), 0.0);
        assert!(sortino_ratio(&[3.0, -1.0]) > 0.0);
        assert_eq!(profit_factor(10.0, 0.0), 100.0);
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert_eq!(max_drawdown(&[0.0, 10.0, 4.0, 12.0, 1.0]), 11.0);
    }
}
