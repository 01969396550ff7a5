//! Selection — a described market-data series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar period unit. Combined with `Selection::multiplier` (e.g. 15 × Minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Tick,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Tick => "tick",
            Timeframe::Second => "second",
            Timeframe::Minute => "minute",
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        };
        f.write_str(s)
    }
}

/// How much history a selection covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionRange {
    Dates {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// The most recent `count` bars.
    BarCount { count: usize },
}

/// Identifies a tradable data series plus its backtest-only settings.
///
/// Immutable for the duration of a backtest run; derived selections are clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub symbol: String,
    pub feed: String,
    pub timeframe: Timeframe,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    pub range: SelectionRange,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    /// Per-unit slippage charged on every simulated trade.
    #[serde(default)]
    pub slippage: f64,
    /// Market-data slot this selection belongs to during a sweep.
    #[serde(default)]
    pub slot: u32,
}

fn default_multiplier() -> u32 {
    1
}

fn default_leverage() -> f64 {
    1.0
}

impl Selection {
    pub fn new(
        symbol: impl Into<String>,
        feed: impl Into<String>,
        timeframe: Timeframe,
        range: SelectionRange,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            feed: feed.into(),
            timeframe,
            multiplier: 1,
            range,
            leverage: 1.0,
            slippage: 0.0,
            slot: 0,
        }
    }

    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Composite grouping/deduplication key over symbol, timeframe and range.
    ///
    /// Feed and backtest-only fields (leverage, slippage, slot) are not part of it.
    pub fn key(&self) -> String {
        let range = match &self.range {
            SelectionRange::Dates { from, to } => {
                format!("{}..{}", from.timestamp(), to.timestamp())
            }
            SelectionRange::BarCount { count } => format!("last{count}"),
        };
        format!(
            "{}|{}x{}|{}",
            self.symbol, self.multiplier, self.timeframe, range
        )
    }
}
