//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over market-data sources so the sweep
//! driver and the signal lifecycle can be fed from a live feed, a CSV import
//! or an in-memory fixture.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Bar, Selection, SelectionRange, Tick};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown feed '{0}'")]
    UnknownFeed(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no bars for {symbol} in requested range")]
    Empty { symbol: String },

    #[error("data unavailable: {0}")]
    Unavailable(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Source of bars and quotes, keyed by (feed, symbol).
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Bars for a selection, oldest first, restricted to its range.
    fn get_bars(&self, selection: &Selection) -> Result<Vec<Bar>, DataError>;

    /// Most recent quote for a symbol.
    fn get_last_tick(&self, feed: &str, symbol: &str) -> Option<Tick>;

    /// Quote in effect at `time`: the latest one at or before it.
    fn get_tick(&self, feed: &str, symbol: &str, time: DateTime<Utc>) -> Option<Tick>;
}

/// Bars held in memory. Quotes are derived from bar closes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataProvider {
    series: HashMap<(String, String), Vec<Bar>>,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bars for `feed`/`bar.symbol`, keeping each series sorted by time.
    pub fn insert_bars(&mut self, feed: &str, bars: impl IntoIterator<Item = Bar>) {
        for bar in bars {
            self.series
                .entry((feed.to_string(), bar.symbol.clone()))
                .or_default()
                .push(bar);
        }
        for series in self.series.values_mut() {
            series.sort_by_key(|b| b.time);
        }
    }

    pub fn with_bars(mut self, feed: &str, bars: impl IntoIterator<Item = Bar>) -> Self {
        self.insert_bars(feed, bars);
        self
    }

    fn series(&self, feed: &str, symbol: &str) -> Option<&Vec<Bar>> {
        self.series.get(&(feed.to_string(), symbol.to_string()))
    }
}

fn close_tick(bar: &Bar) -> Tick {
    Tick::new(bar.time, bar.close_bid, bar.close_ask, bar.total_volume())
}

impl DataProvider for InMemoryDataProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn get_bars(&self, selection: &Selection) -> Result<Vec<Bar>, DataError> {
        if !self.series.keys().any(|(feed, _)| *feed == selection.feed) {
            return Err(DataError::UnknownFeed(selection.feed.clone()));
        }
        let series = self
            .series(&selection.feed, &selection.symbol)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: selection.symbol.clone(),
            })?;

        let bars: Vec<Bar> = match &selection.range {
            SelectionRange::Dates { from, to } => series
                .iter()
                .filter(|b| b.time >= *from && b.time <= *to)
                .cloned()
                .collect(),
            SelectionRange::BarCount { count } => {
                let skip = series.len().saturating_sub(*count);
                series[skip..].to_vec()
            }
        };
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: selection.symbol.clone(),
            });
        }
        Ok(bars)
    }

    fn get_last_tick(&self, feed: &str, symbol: &str) -> Option<Tick> {
        self.series(feed, symbol)?.last().map(close_tick)
    }

    fn get_tick(&self, feed: &str, symbol: &str, time: DateTime<Utc>) -> Option<Tick> {
        self.series(feed, symbol)?
            .iter()
            .rev()
            .find(|b| b.time <= time)
            .map(close_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn provider() -> InMemoryDataProvider {
        let bars = (0..10).map(|i| {
            let px = 100.0 + i as f64;
            Bar::from_mid("SPY", t0() + Duration::days(i), px, px + 1.0, px - 1.0, px, 100.0, 0.2)
        });
        InMemoryDataProvider::new().with_bars("csv", bars)
    }

    fn sel(range: SelectionRange) -> Selection {
        Selection::new("SPY", "csv", Timeframe::Day, range)
    }

    #[test]
    fn bar_count_takes_most_recent() {
        let bars = provider()
            .get_bars(&sel(SelectionRange::BarCount { count: 3 }))
            .unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].time, t0() + Duration::days(7));
    }

    #[test]
    fn date_range_is_inclusive() {
        let bars = provider()
            .get_bars(&sel(SelectionRange::Dates {
                from: t0() + Duration::days(2),
                to: t0() + Duration::days(4),
            }))
            .unwrap();
        assert_eq!(bars.len(), 3);
    }

    #[test]
    fn unknown_symbol_and_feed() {
        let p = provider();
        let mut s = sel(SelectionRange::BarCount { count: 1 });
        s.symbol = "QQQ".into();
        assert!(matches!(p.get_bars(&s), Err(DataError::SymbolNotFound { .. })));
        s.feed = "live".into();
        assert!(matches!(p.get_bars(&s), Err(DataError::UnknownFeed(_))));
    }

    #[test]
    fn ticks_come_from_closes() {
        let p = provider();
        let last = p.get_last_tick("csv", "SPY").unwrap();
        assert!((last.mid() - 109.0).abs() < 1e-10);

        let at = p
            .get_tick("csv", "SPY", t0() + Duration::days(3) + Duration::hours(5))
            .unwrap();
        assert!((at.mid() - 103.0).abs() < 1e-10);
        assert!(p.get_tick("csv", "SPY", t0() - Duration::days(1)).is_none());
    }
}
