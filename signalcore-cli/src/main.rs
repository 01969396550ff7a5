//! SignalCore CLI — parameter sweeps and simulated replays over CSV bars.
//!
//! Commands:
//! - `backtest`: sweep a strategy's parameters and print one JSON summary per
//!   (combination, slot, instrument)
//! - `replay`: run a strategy bar by bar against the simulated broker and
//!   print the resulting positions and broker activity

use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use signalcore_core::data::InMemoryDataProvider;
use signalcore_core::domain::Bar;
use signalcore_runner::strategies::{builtin, BUILTIN};
use signalcore_runner::{
    load_bars_csv, BacktestOutcome, Signal, SignalBindings, SignalConfig, SignalState,
    StartOutcome, StartTrigger, StrategyEvent, SweepProgress,
};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "signalcore",
    about = "SignalCore CLI — strategy sweeps and simulated execution"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the configured strategy's parameters over its selections.
    Backtest {
        /// Path to a TOML signal config.
        #[arg(long)]
        config: PathBuf,

        /// Bar files as SYMBOL=PATH. A bare PATH is used for the first selection's symbol.
        #[arg(long, required = true)]
        bars: Vec<String>,
    },
    /// Run the strategy in simulated mode, one bar event at a time.
    Replay {
        /// Path to a TOML signal config.
        #[arg(long)]
        config: PathBuf,

        /// Bar files as SYMBOL=PATH. A bare PATH is used for the first selection's symbol.
        #[arg(long, required = true)]
        bars: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalcore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest { config, bars } => run_backtest_cmd(config, &bars),
        Commands::Replay { config, bars } => run_replay_cmd(config, &bars),
    }
}

/// Load the config, its strategy and the bar files into an initialised signal.
fn build_signal(config_path: PathBuf, bars: &[String], state: SignalState) -> Result<Arc<Signal>> {
    let config = SignalConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let Some(strategy) = builtin(&config.name) else {
        bail!(
            "unknown strategy '{}' (available: {})",
            config.name,
            BUILTIN.join(", ")
        );
    };
    if config.selections.is_empty() {
        bail!("config has no selections");
    }

    let data = load_data(&config, bars)?;
    let signal = Arc::new(Signal::new(
        config.owner.clone(),
        strategy,
        config.account_id(),
        config.engine.clone(),
    ));
    let bindings = SignalBindings::simulated(Arc::new(data));
    if !signal.init(config.selections.clone(), &config.parameters, state, bindings) {
        for alert in signal.drain_alerts() {
            eprintln!("{alert}");
        }
        bail!("signal '{}' failed to initialise", config.name);
    }
    Ok(signal)
}

fn load_data(config: &SignalConfig, bars: &[String]) -> Result<InMemoryDataProvider> {
    let mut data = InMemoryDataProvider::new();
    for spec in bars {
        let (symbol, path) = match spec.split_once('=') {
            Some((symbol, path)) => (symbol.to_string(), PathBuf::from(path)),
            None => (config.selections[0].symbol.clone(), PathBuf::from(spec)),
        };
        let loaded = load_bars_csv(&path, &symbol)?;
        let feeds: Vec<&str> = config
            .selections
            .iter()
            .filter(|s| s.symbol == symbol)
            .map(|s| s.feed.as_str())
            .collect();
        if feeds.is_empty() {
            bail!("no selection for symbol '{symbol}' ({})", path.display());
        }
        for feed in feeds {
            data.insert_bars(feed, loaded.iter().cloned());
        }
    }
    Ok(data)
}

fn run_backtest_cmd(config_path: PathBuf, bars: &[String]) -> Result<()> {
    let signal = build_signal(config_path, bars, SignalState::Backtesting)?;

    let (tx, rx) = mpsc::channel::<SweepProgress>();
    let handle = signal.spawn_backtest(true, Some(tx))?;
    for update in rx {
        eprint!("\rProgress: {:5.1}%", update.percent);
        let _ = std::io::stderr().flush();
        if update.finished {
            break;
        }
    }
    eprintln!();

    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("backtest thread panicked"))?;
    for alert in signal.drain_alerts() {
        eprintln!("{alert}");
    }

    let report = match outcome {
        BacktestOutcome::Completed(report) => report,
        BacktestOutcome::Aborted(report) => {
            eprintln!("Backtest aborted after {} iterations", report.completed);
            report
        }
        BacktestOutcome::Busy => bail!("backtest rejected: signal busy"),
        BacktestOutcome::NestingLimit => bail!("backtest rejected: nesting limit"),
    };
    info!(
        summaries = report.summaries.len(),
        failed = report.failed,
        "backtest finished"
    );
    println!("{}", serde_json::to_string_pretty(&report.summaries)?);
    Ok(())
}

fn run_replay_cmd(config_path: PathBuf, bars: &[String]) -> Result<()> {
    let signal = build_signal(config_path, bars, SignalState::RunningSimulated)?;

    let mut events: Vec<Bar> = signal
        .selections()
        .iter()
        .flat_map(|s| signal.get_bars(s))
        .collect();
    events.sort_by_key(|b| b.time);

    let mut failures = 0usize;
    for bar in events {
        let time = bar.time;
        match signal.start(StartTrigger::NewBar, &[StrategyEvent::Bar(bar)]) {
            StartOutcome::Completed => {}
            StartOutcome::Failed(msg) => {
                failures += 1;
                eprintln!("{time}: {msg}");
            }
            other => bail!("unexpected start outcome at {time}: {other:?}"),
        }
    }
    for alert in signal.drain_alerts() {
        eprintln!("{alert}");
    }

    let simulator = signal.simulator();
    let broker = simulator.lock();
    println!("Activity:");
    for entry in broker.activity().entries() {
        println!("  {entry}");
    }
    let positions: Vec<_> = broker.all_positions().cloned().collect();
    println!("Positions:");
    println!("{}", serde_json::to_string_pretty(&positions)?);
    println!("Fills: {}  Failed starts: {failures}", broker.fills().len());
    Ok(())
}
