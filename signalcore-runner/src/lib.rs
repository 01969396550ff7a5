//! SignalCore Runner — signal lifecycle, parameter sweeps, statistics.
//!
//! This crate builds on `signalcore-core` to provide:
//! - The signal state machine with single-flight starts and nested backtests
//! - The backtest sweep driver (slot × parameter combination, pausable, stoppable)
//! - Trade statistics and compressed trade logs per backtest summary
//! - TOML signal configuration and CSV bar loading
//! - A registry that fans market events and timers out to running signals

pub mod alerts;
pub mod config;
pub mod data_loader;
pub mod registry;
pub mod replay;
pub mod results;
pub mod signal;
pub mod stats;
pub mod strategies;
pub mod strategy;
pub mod sweep;
pub mod trade_log;

pub use alerts::{Alert, AlertLevel, AlertQueue};
pub use config::{ConfigError, EngineSettings, SignalConfig};
pub use data_loader::{load_bars_csv, provider_from_csv, read_bars, LoadError};
pub use registry::{RegistryError, SignalKey, SignalRegistry};
pub use replay::{replay_bars, BarStep, SimulatedReplay};
pub use results::{
    combination_id, BacktestResults, BacktestSummary, NoProgress, ProgressSink, SharedResults,
    SweepProgress,
};
pub use signal::{BacktestOutcome, Signal, SignalBindings, SignalState, StartOutcome};
pub use stats::{DefaultStatistics, Statistics, TradeEntry, TradeStats};
pub use strategy::{SlotContext, StartTrigger, Strategy, StrategyEvent};
pub use sweep::{
    combination_count, combinations, group_slots, iteration_count, SweepControl, SweepDriver,
    SweepReport, SweepSettings, Uninterrupted, MAX_COMBINATIONS,
};
pub use trade_log::{decode_trade_log, encode_trade_log, TradeLogError};
