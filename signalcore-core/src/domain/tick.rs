use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single quote update: best bid, best ask and traded size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub size: f64,
}

impl Tick {
    pub fn new(time: DateTime<Utc>, bid: f64, ask: f64, size: f64) -> Self {
        Self {
            time,
            bid,
            ask,
            size,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
