//! Bar — one aggregated price interval carrying both sides of the quote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC bar with separate bid and ask series plus per-side volume.
///
/// Data feeds that only publish trade prices can use [`Bar::from_mid`], which
/// spreads a single OHLC series symmetrically around the mid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub open_bid: f64,
    pub high_bid: f64,
    pub low_bid: f64,
    pub close_bid: f64,
    pub open_ask: f64,
    pub high_ask: f64,
    pub low_ask: f64,
    pub close_ask: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
}

impl Bar {
    /// Build a bar from a single OHLC series and a constant spread.
    #[allow(clippy::too_many_arguments)]
    pub fn from_mid(
        symbol: impl Into<String>,
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        spread: f64,
    ) -> Self {
        let half = spread / 2.0;
        Self {
            symbol: symbol.into(),
            time,
            open_bid: open - half,
            high_bid: high - half,
            low_bid: low - half,
            close_bid: close - half,
            open_ask: open + half,
            high_ask: high + half,
            low_ask: low + half,
            close_ask: close + half,
            bid_volume: volume / 2.0,
            ask_volume: volume / 2.0,
        }
    }

    pub fn open_mid(&self) -> f64 {
        (self.open_bid + self.open_ask) / 2.0
    }

    pub fn close_mid(&self) -> f64 {
        (self.close_bid + self.close_ask) / 2.0
    }

    /// Combined bid and ask volume.
    pub fn total_volume(&self) -> f64 {
        self.bid_volume + self.ask_volume
    }

    /// True if the bar closed at or above its open (compared on mids).
    pub fn closed_up(&self) -> bool {
        self.close_bid + self.close_ask >= self.open_bid + self.open_ask
    }

    /// Returns true if any price field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        [
            self.open_bid,
            self.high_bid,
            self.low_bid,
            self.close_bid,
            self.open_ask,
            self.high_ask,
            self.low_ask,
            self.close_ask,
        ]
        .iter()
        .any(|p| p.is_nan())
    }

    /// Basic sanity check on both sides: high >= open/close >= low, ask >= bid.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        let side_ok = |o: f64, h: f64, l: f64, c: f64| h >= l && h >= o && h >= c && l <= o && l <= c;
        side_ok(self.open_bid, self.high_bid, self.low_bid, self.close_bid)
            && side_ok(self.open_ask, self.high_ask, self.low_ask, self.close_ask)
            && self.open_ask >= self.open_bid
            && self.close_ask >= self.close_bid
    }
}
