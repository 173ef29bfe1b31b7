use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use msr_retest_capture::application::market_data::candle_aggregator::KlineAggregator;
use msr_retest_capture::application::strategies::{AtrPercentileTracker, MsrStrategy};
use msr_retest_capture::application::ReplayService;
use msr_retest_capture::config::StrategyConfig;
use msr_retest_capture::domain::market::candle::Candle;
use msr_retest_capture::domain::market::candle_buffer::ColdCandleBuffer;
use msr_retest_capture::domain::market::timeframe::Timeframe;
use msr_retest_capture::domain::repositories::SignalStore;
use msr_retest_capture::infrastructure::repositories::in_memory::{
    InMemoryCandleStore, InMemoryCheckpointStore, InMemorySignalStore, InMemoryStreakStore,
};

/// MSR Retest Capture: a real-time signal engine for mean-support/
/// resistance retest setups. This binary is a thin driver around the
/// library; production deployments embed the core directly.
#[derive(Parser)]
#[command(name = "msr-retest-capture", version, about)]
struct Cli {
    /// Path to a TOML strategy config file. Falls back to environment
    /// variables (see `StrategyConfig::from_env`) when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stubbed: backtesting is an external collaborator, not part of
    /// this core. Use the crate as a library instead.
    Backtest,

    /// Replay historical 1-minute candles (newline-delimited JSON) from
    /// the last checkpoint forward, reconstructing strategy state.
    Replay {
        /// Path to a newline-delimited JSON file of `Candle` records.
        candles: PathBuf,

        /// Only replay this symbol's candles.
        #[arg(long)]
        symbol: String,
    },

    /// Run the full candle file through the strategy and print the
    /// resulting signals and active positions.
    Status {
        /// Path to a newline-delimited JSON file of `Candle` records.
        candles: PathBuf,

        /// Only process this symbol's candles.
        #[arg(long)]
        symbol: String,
    },
}

fn load_strategy_config(path: Option<&PathBuf>) -> anyhow::Result<StrategyConfig> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            StrategyConfig::from_toml_str(&contents)
        }
        None => StrategyConfig::from_env(),
    }
}

fn load_candles(path: &PathBuf, symbol: &str) -> anyhow::Result<Vec<Candle>> {
    let contents = fs::read_to_string(path)?;
    let mut candles = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let candle: Candle = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("{}:{}: {}", path.display(), lineno + 1, e))?;
        if candle.symbol == symbol {
            candles.push(candle);
        }
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn target_timeframes(config: &StrategyConfig) -> Vec<Timeframe> {
    config
        .target_timeframes
        .iter()
        .filter_map(|s| Timeframe::from_str(s).ok())
        .collect()
}

async fn run_replay(config: StrategyConfig, candles_path: PathBuf, symbol: String) -> anyhow::Result<()> {
    let candles = load_candles(&candles_path, &symbol)?;
    if candles.is_empty() {
        anyhow::bail!("no candles for symbol {symbol} in {}", candles_path.display());
    }

    let candle_store = Arc::new(InMemoryCandleStore::new());
    candle_store.seed(candles.clone()).await;
    let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
    let signal_store = Arc::new(InMemorySignalStore::new());
    let streak_store = Arc::new(InMemoryStreakStore::new());

    let replay = ReplayService::new(candle_store, checkpoint_store);
    let checkpoint_time = replay.get_checkpoint_time(&symbol).await?;
    let from = match checkpoint_time {
        Some(t) => t,
        None => {
            let initial = candles.first().map(|c| c.timestamp - 1).unwrap_or(0);
            replay.initialize_state(&symbol, initial).await?;
            initial
        }
    };

    let mut aggregator = KlineAggregator::new(target_timeframes(&config));
    let mut buffers: HashMap<(String, String), ColdCandleBuffer> = HashMap::new();
    let atr_tracker = Some(AtrPercentileTracker::new());
    let mut strategy = MsrStrategy::new(config, atr_tracker)
        .with_signal_store(signal_store)
        .with_streak_store(streak_store);
    strategy.init().await?;

    let replayed = replay
        .replay_from_checkpoint(&symbol, from, &mut aggregator, &mut buffers, &mut strategy)
        .await?;

    info!(symbol = %symbol, replayed, "replay finished");
    println!("replayed {replayed} candles for {symbol}");
    Ok(())
}

async fn run_status(config: StrategyConfig, candles_path: PathBuf, symbol: String) -> anyhow::Result<()> {
    let candles = load_candles(&candles_path, &symbol)?;
    if candles.is_empty() {
        anyhow::bail!("no candles for symbol {symbol} in {}", candles_path.display());
    }

    let signal_store = Arc::new(InMemorySignalStore::new());
    let streak_store = Arc::new(InMemoryStreakStore::new());

    let mut aggregator = KlineAggregator::new(target_timeframes(&config));
    let mut buffers: HashMap<(String, String), ColdCandleBuffer> = HashMap::new();
    let atr_tracker = Some(AtrPercentileTracker::new());
    let mut strategy = MsrStrategy::new(config, atr_tracker)
        .with_signal_store(signal_store.clone())
        .with_streak_store(streak_store);
    strategy.init().await?;

    for candle in &candles {
        let key = (candle.symbol.clone(), "1m".to_string());
        let buffer = buffers
            .entry(key)
            .or_insert_with(|| ColdCandleBuffer::new(candle.symbol.clone(), "1m".to_string()));
        buffer.add(candle.clone());
        strategy.process_candle(candle, "1m", buffer).await;

        let fast = msr_retest_capture::domain::signal::converters::candle_to_fast(candle);
        for (timeframe, agg_fast) in aggregator.add_1m(&candle.symbol, fast) {
            let tf = timeframe.to_binance_string();
            let agg_candle =
                msr_retest_capture::domain::signal::converters::fast_to_candle(&candle.symbol, &agg_fast);
            let key = (candle.symbol.clone(), tf.to_string());
            let buffer = buffers
                .entry(key)
                .or_insert_with(|| ColdCandleBuffer::new(candle.symbol.clone(), tf.to_string()));
            buffer.add(agg_candle.clone());
            strategy.process_candle(&agg_candle, tf, buffer).await;
        }
    }

    let active = signal_store.get_active(Some(&symbol)).await?;
    let stats = signal_store.get_stats().await?;
    println!("processed {} candles for {}", candles.len(), symbol);
    println!(
        "signals: {} active, {} tp, {} sl",
        stats.active, stats.tp, stats.sl
    );
    for signal in &active {
        println!(
            "  {} {} {:?} entry={} tp={} sl={}",
            signal.id, signal.timeframe, signal.direction, signal.entry_price, signal.tp_price, signal.sl_price
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Command::Backtest) {
        println!("backtest is not part of this core; use msr_retest_capture as a library");
        return ExitCode::SUCCESS;
    }

    let config = match load_strategy_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load strategy config");
            return ExitCode::from(2);
        }
    };

    let result = match &cli.command {
        Command::Backtest => unreachable!("handled above"),
        Command::Replay { candles, symbol } => run_replay(config, candles.clone(), symbol.clone()).await,
        Command::Status { candles, symbol } => run_status(config, candles.clone(), symbol.clone()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(1)
        }
    }
}
