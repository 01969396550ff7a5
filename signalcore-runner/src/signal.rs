//! Signal lifecycle — one strategy instance, its state and its order routing.
//!
//! States and the transitions `set_state` allows:
//!
//! ```text
//!   Running ⇄ RunningSimulated      Backtesting ⇄ BacktestingPaused
//!             any state → Stopped (releases the bound broker)
//! ```
//!
//! Concurrency: `start` and `backtest` are single-flight through an atomic busy
//! flag. Callers on other threads get `Busy` immediately, while strategy code
//! running on the claiming thread may call back into its own signal. Init,
//! start, parameter access and backtests serialize on a reentrant section, and
//! backtest nesting is bounded by a depth counter.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use signalcore_core::broker::{Broker, ModifyOrder};
use signalcore_core::data::{DataProvider, InMemoryDataProvider};
use signalcore_core::domain::{
    apply_parameters, AccountId, Bar, Order, OrderId, OrderParams, Position, ScriptingParameter,
    Selection, Tick,
};
use signalcore_core::sim::SimulatedBroker;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertLevel, AlertQueue};
use crate::config::EngineSettings;
use crate::results::{BacktestSummary, NoProgress, ProgressSink, SharedResults, SweepProgress, Tee};
use crate::strategy::{StartTrigger, Strategy, StrategyEvent};
use crate::sweep::{run_guarded, SweepControl, SweepDriver, SweepReport, SweepSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalState {
    Stopped,
    Running,
    RunningSimulated,
    Backtesting,
    BacktestingPaused,
}

impl SignalState {
    /// Whether `set_state` may move from `self` to `to`.
    pub fn can_transition(self, to: SignalState) -> bool {
        use SignalState::*;
        matches!(
            (self, to),
            (_, Stopped)
                | (Running, RunningSimulated)
                | (RunningSimulated, Running)
                | (Backtesting, BacktestingPaused)
                | (BacktestingPaused, Backtesting)
        )
    }

    pub fn is_running(self) -> bool {
        matches!(self, SignalState::Running | SignalState::RunningSimulated)
    }

    pub fn is_backtesting(self) -> bool {
        matches!(self, SignalState::Backtesting | SignalState::BacktestingPaused)
    }

    /// Order actions in this state go to the simulated broker.
    pub fn routes_to_simulator(self) -> bool {
        matches!(
            self,
            SignalState::RunningSimulated | SignalState::Backtesting | SignalState::BacktestingPaused
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Completed,
    /// Another invocation is still executing.
    Busy,
    /// The signal is not in a running state.
    NotRunning,
    /// The strategy returned an error or panicked.
    Failed(String),
}

#[derive(Debug)]
pub enum BacktestOutcome {
    Completed(SweepReport),
    /// Stopped before every iteration ran; holds the partial results.
    Aborted(SweepReport),
    /// Rejected: another thread is running a start or backtest on this signal.
    Busy,
    /// Rejected: too many backtests already nested on this signal.
    NestingLimit,
}

impl BacktestOutcome {
    pub fn report(&self) -> Option<&SweepReport> {
        match self {
            BacktestOutcome::Completed(r) | BacktestOutcome::Aborted(r) => Some(r),
            BacktestOutcome::Busy | BacktestOutcome::NestingLimit => None,
        }
    }
}

/// Collaborators bound at init.
#[derive(Clone)]
pub struct SignalBindings {
    pub data: Arc<dyn DataProvider>,
    /// Real broker. Without one, `Running` has nowhere to route orders.
    pub broker: Option<Arc<dyn Broker>>,
}

impl SignalBindings {
    pub fn simulated(data: Arc<dyn DataProvider>) -> Self {
        Self { data, broker: None }
    }
}

/// Releases a busy claim when dropped, unless `exit` already took it away.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    holder: &'a Mutex<Option<ThreadId>>,
    thread: ThreadId,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut holder = self.holder.lock();
        if *holder == Some(self.thread) {
            *holder = None;
            self.busy.store(false, Ordering::Release);
        }
    }
}

/// Decrements the counter when dropped.
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Signal {
    owner: String,
    name: String,
    account: AccountId,
    settings: EngineSettings,
    strategy: Arc<dyn Strategy>,
    state: Mutex<SignalState>,
    busy: AtomicBool,
    busy_holder: Mutex<Option<ThreadId>>,
    nesting: AtomicUsize,
    section: ReentrantMutex<()>,
    parameters: Mutex<Vec<ScriptingParameter>>,
    selections: Mutex<Vec<Selection>>,
    bindings: Mutex<Option<SignalBindings>>,
    simulator: Arc<Mutex<SimulatedBroker>>,
    results: SharedResults,
    alerts: AlertQueue,
    last_start: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl Signal {
    pub fn new(
        owner: impl Into<String>,
        strategy: Arc<dyn Strategy>,
        account: AccountId,
        settings: EngineSettings,
    ) -> Self {
        let simulator = SimulatedBroker::with_cost_model(settings.cost_model());
        Self {
            owner: owner.into(),
            name: strategy.name().to_string(),
            account,
            parameters: Mutex::new(strategy.parameters()),
            strategy,
            settings,
            state: Mutex::new(SignalState::Stopped),
            busy: AtomicBool::new(false),
            busy_holder: Mutex::new(None),
            nesting: AtomicUsize::new(0),
            section: ReentrantMutex::new(()),
            selections: Mutex::new(Vec::new()),
            bindings: Mutex::new(None),
            simulator: Arc::new(Mutex::new(simulator)),
            results: SharedResults::new(),
            alerts: AlertQueue::new(),
            last_start: Mutex::new(None),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> SignalState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn selections(&self) -> Vec<Selection> {
        self.selections.lock().clone()
    }

    pub fn last_start(&self) -> Option<DateTime<Utc>> {
        *self.last_start.lock()
    }

    /// The simulated broker used outside of sweeps (simulated running and
    /// order wrappers in backtest states).
    pub fn simulator(&self) -> Arc<Mutex<SimulatedBroker>> {
        Arc::clone(&self.simulator)
    }

    pub fn results(&self) -> &SharedResults {
        &self.results
    }

    pub fn backtest_progress(&self) -> f64 {
        self.results.progress()
    }

    pub fn take_new_summaries(&self) -> Vec<BacktestSummary> {
        self.results.take_new()
    }

    /// Get and clear pending alerts.
    pub fn drain_alerts(&self) -> Vec<Alert> {
        self.alerts.drain()
    }

    fn alert(&self, level: AlertLevel, message: impl Into<String>) {
        self.alerts.push(level, &self.name, message);
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Bind collaborators, apply parameters and run the strategy's setup.
    ///
    /// Returns `false` (and records an alert) if parameters do not apply or
    /// the strategy's setup fails; the signal is then left `Stopped`.
    pub fn init(
        &self,
        selections: Vec<Selection>,
        params: &[ScriptingParameter],
        state: SignalState,
        bindings: SignalBindings,
    ) -> bool {
        let _section = self.section.lock();

        let mut working = self.parameters.lock().clone();
        if let Err(e) = apply_parameters(&mut working, params) {
            self.alert(AlertLevel::Error, format!("init failed: {e}"));
            return false;
        }
        *self.parameters.lock() = working;
        *self.selections.lock() = selections;
        *self.bindings.lock() = Some(bindings);
        self.simulator.lock().reset();
        *self.last_start.lock() = None;

        if let Err(msg) = run_guarded(|| self.strategy.internal_init(self)) {
            self.alert(AlertLevel::Error, format!("init failed: {msg}"));
            *self.bindings.lock() = None;
            *self.state.lock() = SignalState::Stopped;
            return false;
        }

        *self.state.lock() = state;
        info!(owner = %self.owner, signal = %self.name, ?state, "signal initialised");
        true
    }

    /// Request a state change. Disallowed transitions change nothing and return `false`.
    pub fn set_state(&self, to: SignalState) -> bool {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition(to) {
            debug!(signal = %self.name, ?from, ?to, "rejected state transition");
            return false;
        }
        if to == SignalState::Stopped {
            drop(state);
            self.exit(None);
            return true;
        }
        *state = to;
        info!(signal = %self.name, ?from, ?to, "state changed");
        true
    }

    /// Force `Stopped`, clear the busy flag and release the bound broker.
    pub fn exit(&self, message: Option<&str>) {
        *self.state.lock() = SignalState::Stopped;
        *self.busy_holder.lock() = None;
        self.busy.store(false, Ordering::Release);
        if let Some(bindings) = self.bindings.lock().as_mut() {
            bindings.broker = None;
        }
        if let Some(message) = message {
            self.alert(AlertLevel::Info, message);
        }
        info!(owner = %self.owner, signal = %self.name, "signal stopped");
    }

    /// Run the strategy's per-event logic, unless an invocation is already in flight.
    pub fn start(&self, trigger: StartTrigger, events: &[StrategyEvent]) -> StartOutcome {
        self.start_at(trigger, events, Utc::now())
    }

    /// [`Signal::start`] with an explicit invocation time, as recorded for
    /// periodic scheduling.
    pub fn start_at(
        &self,
        trigger: StartTrigger,
        events: &[StrategyEvent],
        now: DateTime<Utc>,
    ) -> StartOutcome {
        let Some(_busy) = self.claim() else {
            debug!(signal = %self.name, ?trigger, "start skipped: busy");
            return StartOutcome::Busy;
        };
        let _section = self.section.lock();

        let state = self.state();
        if !state.is_running() {
            return StartOutcome::NotRunning;
        }
        *self.last_start.lock() = Some(now);

        if state == SignalState::RunningSimulated {
            let mut sim = self.simulator.lock();
            for event in events {
                if let StrategyEvent::Bar(bar) = event {
                    sim.process_bar(&bar.symbol, bar);
                }
            }
        }

        match run_guarded(|| self.strategy.internal_start(self, trigger, events)) {
            Ok(()) => StartOutcome::Completed,
            Err(msg) => {
                self.alert(AlertLevel::Error, format!("start failed: {msg}"));
                StartOutcome::Failed(msg)
            }
        }
    }

    /// Whether the periodic wake-up interval has elapsed since the last start.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Some(secs) = self.settings.start_interval_secs else {
            return false;
        };
        if !self.state().is_running() {
            return false;
        }
        match self.last_start() {
            None => true,
            Some(last) => (now - last).num_seconds() >= secs as i64,
        }
    }

    // ── Backtesting ────────────────────────────────────────────────────

    /// Sweep the strategy's parameters over its selections.
    ///
    /// With `push_to_signal` the signal's shared results are reset and fed as
    /// the sweep runs, so [`Signal::take_new_summaries`] and
    /// [`Signal::backtest_progress`] can be polled meanwhile.
    pub fn backtest(&self, push_to_signal: bool) -> BacktestOutcome {
        self.backtest_with(push_to_signal, &NoProgress)
    }

    /// [`Signal::backtest`], also reporting to `progress`.
    pub fn backtest_with(&self, push_to_signal: bool, progress: &dyn ProgressSink) -> BacktestOutcome {
        let _busy = match self.claim() {
            Some(guard) => Some(guard),
            // Strategy code on this thread calling back into its own signal.
            None if self.holds_busy() => None,
            None => {
                debug!(signal = %self.name, "backtest skipped: busy");
                return BacktestOutcome::Busy;
            }
        };
        let _section = self.section.lock();

        let depth = self.nesting.fetch_add(1, Ordering::AcqRel) + 1;
        let _depth = DepthGuard(&self.nesting);
        if depth > self.settings.max_backtest_depth {
            self.alert(
                AlertLevel::Warning,
                format!(
                    "backtest rejected: nesting depth {depth} exceeds {}",
                    self.settings.max_backtest_depth
                ),
            );
            return BacktestOutcome::NestingLimit;
        }

        let data: Arc<dyn DataProvider> = self
            .bindings
            .lock()
            .as_ref()
            .map(|b| Arc::clone(&b.data))
            .unwrap_or_else(|| Arc::new(InMemoryDataProvider::new()));
        let params = self.parameters.lock().clone();
        let selections = self.selections.lock().clone();

        let settings = SweepSettings {
            pause_poll: self.settings.pause_poll(),
            cost_model: self.settings.cost_model(),
            account: self.account.clone(),
            source: self.name.clone(),
        };
        let tee;
        let sink: &dyn ProgressSink = if push_to_signal {
            self.results.reset();
            tee = Tee(&self.results, progress);
            &tee
        } else {
            progress
        };

        let report = SweepDriver::new(self.strategy.as_ref(), data.as_ref(), settings)
            .with_control(self)
            .with_sink(sink)
            .with_alerts(&self.alerts)
            .run(&params, &selections);

        if report.aborted {
            BacktestOutcome::Aborted(report)
        } else {
            BacktestOutcome::Completed(report)
        }
    }

    fn claim(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let thread = thread::current().id();
        *self.busy_holder.lock() = Some(thread);
        Some(BusyGuard {
            busy: &self.busy,
            holder: &self.busy_holder,
            thread,
        })
    }

    fn holds_busy(&self) -> bool {
        *self.busy_holder.lock() == Some(thread::current().id())
    }

    /// Run [`Signal::backtest`] on a named worker thread.
    pub fn spawn_backtest(
        self: &Arc<Self>,
        push_to_signal: bool,
        progress: Option<Sender<SweepProgress>>,
    ) -> std::io::Result<JoinHandle<BacktestOutcome>> {
        let signal = Arc::clone(self);
        thread::Builder::new()
            .name(format!("backtest-{}", self.name))
            .spawn(move || match progress {
                Some(tx) => signal.backtest_with(push_to_signal, &tx),
                None => signal.backtest(push_to_signal),
            })
    }

    // ── Parameters ─────────────────────────────────────────────────────

    /// Snapshot of the working parameters.
    pub fn get_parameters(&self) -> Vec<ScriptingParameter> {
        let _section = self.section.lock();
        self.parameters.lock().clone()
    }

    /// Apply parameters by name; all or nothing.
    pub fn set_parameters(&self, params: &[ScriptingParameter]) -> bool {
        let _section = self.section.lock();
        let mut working = self.parameters.lock().clone();
        match apply_parameters(&mut working, params) {
            Ok(()) => {
                *self.parameters.lock() = working;
                true
            }
            Err(e) => {
                self.alert(AlertLevel::Error, format!("set parameters failed: {e}"));
                false
            }
        }
    }

    // ── Broker and data wrappers ───────────────────────────────────────

    fn route(&self, action: &str) -> Option<Arc<dyn Broker>> {
        let state = self.state();
        let broker = if state.routes_to_simulator() {
            let sim: Arc<dyn Broker> = self.simulator.clone();
            Some(sim)
        } else if state == SignalState::Running {
            self.bindings.lock().as_ref().and_then(|b| b.broker.clone())
        } else {
            None
        };
        if broker.is_none() {
            warn!(signal = %self.name, ?state, action, "no broker available");
        }
        broker
    }

    pub fn place_order(&self, params: OrderParams) -> Option<Order> {
        let Some(mut params) = self.strategy.analyze_pre_trade(params) else {
            debug!(signal = %self.name, "order vetoed by pre-trade check");
            return None;
        };
        if params.origin.is_none() {
            params.origin = Some(self.name.clone());
        }
        let broker = self.route("place_order")?;
        match broker.place_order(&self.account, params.clone()) {
            Ok(order) => {
                self.strategy.analyze_post_trade(&order);
                Some(order)
            }
            Err(e) => {
                warn!(signal = %self.name, broker = broker.name(), "place_order failed: {e}");
                self.strategy.process_trade_failure(&params, &e);
                None
            }
        }
    }

    pub fn modify_order(&self, id: OrderId, changes: &ModifyOrder) -> Option<Order> {
        let broker = self.route("modify_order")?;
        broker
            .modify_order(&self.account, id, changes)
            .map_err(|e| warn!(signal = %self.name, %id, "modify_order failed: {e}"))
            .ok()
    }

    pub fn cancel_order(&self, id: OrderId) -> Option<Order> {
        let broker = self.route("cancel_order")?;
        broker
            .cancel_order(&self.account, id)
            .map_err(|e| warn!(signal = %self.name, %id, "cancel_order failed: {e}"))
            .ok()
    }

    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        let broker = self.route("get_order")?;
        broker
            .get_order(&self.account, id)
            .map_err(|e| warn!(signal = %self.name, %id, "get_order failed: {e}"))
            .ok()
            .flatten()
    }

    pub fn get_orders(&self) -> Vec<Order> {
        let Some(broker) = self.route("get_orders") else {
            return Vec::new();
        };
        broker.get_orders(&self.account).unwrap_or_else(|e| {
            warn!(signal = %self.name, "get_orders failed: {e}");
            Vec::new()
        })
    }

    pub fn get_positions(&self) -> Vec<Position> {
        let Some(broker) = self.route("get_positions") else {
            return Vec::new();
        };
        broker.get_positions(&self.account).unwrap_or_else(|e| {
            warn!(signal = %self.name, "get_positions failed: {e}");
            Vec::new()
        })
    }

    pub fn close_position(&self, symbol: &str) -> Option<Order> {
        let broker = self.route("close_position")?;
        broker
            .close_position(&self.account, symbol)
            .map_err(|e| warn!(signal = %self.name, symbol, "close_position failed: {e}"))
            .ok()
            .flatten()
    }

    pub fn close_all_positions(&self) -> Vec<Order> {
        let Some(broker) = self.route("close_all_positions") else {
            return Vec::new();
        };
        broker.close_all_positions(&self.account).unwrap_or_else(|e| {
            warn!(signal = %self.name, "close_all_positions failed: {e}");
            Vec::new()
        })
    }

    fn data(&self) -> Option<Arc<dyn DataProvider>> {
        self.bindings.lock().as_ref().map(|b| Arc::clone(&b.data))
    }

    pub fn get_bars(&self, selection: &Selection) -> Vec<Bar> {
        let Some(data) = self.data() else {
            return Vec::new();
        };
        data.get_bars(selection).unwrap_or_else(|e| {
            warn!(signal = %self.name, symbol = %selection.symbol, "get_bars failed: {e}");
            Vec::new()
        })
    }

    pub fn get_last_tick(&self, feed: &str, symbol: &str) -> Option<Tick> {
        self.data()?.get_last_tick(feed, symbol)
    }

    pub fn get_tick(&self, feed: &str, symbol: &str, time: DateTime<Utc>) -> Option<Tick> {
        self.data()?.get_tick(feed, symbol, time)
    }
}

impl SweepControl for Signal {
    fn is_paused(&self) -> bool {
        self.state() == SignalState::BacktestingPaused
    }

    fn is_stopped(&self) -> bool {
        self.state() == SignalState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use SignalState::*;
        assert!(Running.can_transition(RunningSimulated));
        assert!(RunningSimulated.can_transition(Running));
        assert!(Backtesting.can_transition(BacktestingPaused));
        assert!(BacktestingPaused.can_transition(Backtesting));
        for s in [Stopped, Running, RunningSimulated, Backtesting, BacktestingPaused] {
            assert!(s.can_transition(Stopped));
        }
        assert!(!Stopped.can_transition(Running));
        assert!(!Running.can_transition(Backtesting));
        assert!(!BacktestingPaused.can_transition(Running));
    }

    #[test]
    fn routing_by_state() {
        use SignalState::*;
        assert!(!Running.routes_to_simulator());
        assert!(RunningSimulated.routes_to_simulator());
        assert!(Backtesting.routes_to_simulator());
        assert!(BacktestingPaused.routes_to_simulator());
        assert!(!Stopped.routes_to_simulator());
    }
}
