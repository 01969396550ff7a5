//! Backtest summaries and the shared, append-only results buffer.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use signalcore_core::domain::ParamSet;

use crate::stats::TradeStats;

/// Result of one (combination × slot × instrument).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub slot: u32,
    /// Position of the combination in the sweep's deterministic order.
    pub combination_index: usize,
    /// Short content hash of the parameter values.
    pub combination_id: String,
    pub params: ParamSet,
    pub instrument: String,
    pub leverage: f64,
    pub stats: TradeStats,
    /// Gzip-compressed `timestamp|signed-price|quantity;` records.
    #[serde(with = "hex_bytes")]
    pub trade_log: Vec<u8>,
    /// Sweep progress when this summary was recorded.
    pub progress: f64,
}

/// Deterministic short ID for a parameter combination.
pub fn combination_id(params: &ParamSet) -> String {
    let hash = blake3::hash(params.to_string().as_bytes());
    hash.to_hex()[..16].to_string()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Incremental progress published after each combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepProgress {
    /// Summaries produced since the previous update.
    pub new_summaries: usize,
    /// `completed / total * 100`.
    pub percent: f64,
    pub finished: bool,
}

/// Receives progress as a sweep runs.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, new: &[BacktestSummary], percent: f64);

    /// Called once, after the last combination or on abort.
    fn on_finished(&self, _aborted: bool) {}
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _new: &[BacktestSummary], _percent: f64) {}
}

impl ProgressSink for Sender<SweepProgress> {
    fn on_progress(&self, new: &[BacktestSummary], percent: f64) {
        // A dropped receiver just means nobody is watching.
        let _ = self.send(SweepProgress {
            new_summaries: new.len(),
            percent,
            finished: false,
        });
    }

    fn on_finished(&self, _aborted: bool) {
        let _ = self.send(SweepProgress {
            new_summaries: 0,
            percent: 100.0,
            finished: true,
        });
    }
}

/// Append-only summaries with a read cursor for incremental polling.
#[derive(Debug, Clone, Default)]
pub struct BacktestResults {
    summaries: Vec<BacktestSummary>,
    cursor: usize,
    progress: f64,
    finished: bool,
}

impl BacktestResults {
    pub fn push(&mut self, summary: BacktestSummary) {
        self.summaries.push(summary);
    }

    pub fn all(&self) -> &[BacktestSummary] {
        &self.summaries
    }

    /// Summaries appended since the last call.
    pub fn take_new(&mut self) -> Vec<BacktestSummary> {
        let new = self.summaries[self.cursor..].to_vec();
        self.cursor = self.summaries.len();
        new
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Results buffer shared between a running sweep and its observers.
#[derive(Debug, Clone, Default)]
pub struct SharedResults(Arc<Mutex<BacktestResults>>);

impl SharedResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear for a new sweep.
    pub fn reset(&self) {
        *self.0.lock() = BacktestResults::default();
    }

    pub fn progress(&self) -> f64 {
        self.0.lock().progress
    }

    pub fn is_finished(&self) -> bool {
        self.0.lock().finished
    }

    pub fn take_new(&self) -> Vec<BacktestSummary> {
        self.0.lock().take_new()
    }

    pub fn snapshot(&self) -> Vec<BacktestSummary> {
        self.0.lock().summaries.clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressSink for SharedResults {
    fn on_progress(&self, new: &[BacktestSummary], percent: f64) {
        let mut results = self.0.lock();
        results.summaries.extend_from_slice(new);
        results.progress = percent;
    }

    fn on_finished(&self, _aborted: bool) {
        let mut results = self.0.lock();
        results.progress = 100.0;
        results.finished = true;
    }
}

/// Forwards every event to two sinks.
pub struct Tee<'a>(pub &'a dyn ProgressSink, pub &'a dyn ProgressSink);

impl ProgressSink for Tee<'_> {
    fn on_progress(&self, new: &[BacktestSummary], percent: f64) {
        self.0.on_progress(new, percent);
        self.1.on_progress(new, percent);
    }

    fn on_finished(&self, aborted: bool) {
        self.0.on_finished(aborted);
        self.1.on_finished(aborted);
    }
}
