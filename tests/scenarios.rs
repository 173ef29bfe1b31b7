//! End-to-end scenarios exercising the pipeline the way a live deployment
//! would: candle ingestion through the aggregator and strategy, trade
//! ticks through the position tracker, and checkpointed replay.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use msr_retest_capture::application::market_data::candle_aggregator::KlineAggregator;
use msr_retest_capture::application::position_tracker::PositionTracker;
use msr_retest_capture::application::replay::ReplayService;
use msr_retest_capture::application::strategies::msr_retest::MsrStrategy;
use msr_retest_capture::config::strategy_config::StrategyConfig;
use msr_retest_capture::domain::market::candle::{AggTrade, Candle};
use msr_retest_capture::domain::market::candle_buffer::ColdCandleBuffer;
use msr_retest_capture::domain::repositories::SignalStore;
use msr_retest_capture::domain::signal::converters::fast_to_signal;
use msr_retest_capture::domain::signal::fast::{DIRECTION_LONG, FastCandle, FastSignal};
use msr_retest_capture::domain::signal::signal::{Direction, Signal};
use msr_retest_capture::infrastructure::repositories::in_memory::{
    InMemoryCandleStore, InMemoryCheckpointStore, InMemorySignalCache, InMemorySignalStore,
};

fn config() -> StrategyConfig {
    StrategyConfig {
        ema_period: 50,
        fib_period: 9,
        atr_period: 9,
        tp_atr_mult: dec!(2.0),
        sl_atr_mult: dec!(8.84),
        touch_tolerance: dec!(0.001),
        symbols: vec!["BTCUSDT".into()],
        timeframes: vec!["5m".into()],
        target_timeframes: vec!["5m".into()],
        filters: HashMap::new(),
    }
}

fn flat_candle(index: i64) -> Candle {
    Candle {
        symbol: "BTCUSDT".into(),
        open: dec!(100),
        high: dec!(100),
        low: dec!(100),
        close: dec!(100),
        volume: dec!(10),
        timestamp: 1_704_067_200_000 + index * 60_000,
        is_closed: true,
    }
}

/// Uptrend + support retest + bullish close -> SHORT, per the level
/// scoring and trend rule applied to a 50-candle buffer of otherwise
/// flat prints.
fn short_trigger_candle() -> Candle {
    Candle {
        symbol: "BTCUSDT".into(),
        open: dec!(99),
        high: dec!(101),
        low: dec!(97.5),
        close: dec!(100.8),
        volume: dec!(10),
        timestamp: 1_704_067_200_000 + 49 * 60_000,
        is_closed: true,
    }
}

/// Downtrend + resistance retest + bearish close -> LONG, computed
/// against the buffer left behind by `short_trigger_candle`.
fn long_trigger_candle() -> Candle {
    Candle {
        symbol: "BTCUSDT".into(),
        open: dec!(100.5),
        high: dec!(101.5),
        low: dec!(98.8),
        close: dec!(99.0),
        volume: dec!(10),
        timestamp: 1_704_067_200_000 + 50 * 60_000,
        is_closed: true,
    }
}

fn seeded_buffer() -> ColdCandleBuffer {
    let mut buffer = ColdCandleBuffer::new("BTCUSDT", "5m");
    for i in 0..49 {
        buffer.add(flat_candle(i));
    }
    buffer.add(short_trigger_candle());
    buffer
}

fn trade(symbol: &str, price: Decimal, timestamp_ms: i64) -> AggTrade {
    AggTrade {
        symbol: symbol.to_string(),
        agg_trade_id: timestamp_ms,
        price,
        quantity: Decimal::ONE,
        timestamp: timestamp_ms,
        is_buyer_maker: false,
    }
}

#[tokio::test]
async fn long_mae_mfe_track_ticks_up_to_take_profit() {
    let tracker = PositionTracker::new(
        Arc::new(InMemorySignalStore::new()),
        Arc::new(InMemorySignalCache::new()),
    );

    let fast = FastSignal::new(
        "sig-a".into(),
        "BTCUSDT".into(),
        "5m".into(),
        1_704_067_200.0,
        DIRECTION_LONG,
        50000.0,
        50200.0,
        49116.0,
    );
    tracker.add_signal(&fast_to_signal(&fast)).await.unwrap();

    let ticks = [
        (49800.0, 0.2262, 0.0),
        (49500.0, 0.5656, 0.0),
        (50000.0, 0.5656, 0.0),
        (50100.0, 0.5656, 0.1131),
    ];

    for (i, (price, expected_mae, expected_mfe)) in ticks.iter().enumerate() {
        tracker
            .process_trade(&trade(
                "BTCUSDT",
                Decimal::from_f64_retain(*price).unwrap(),
                1_704_067_200_000 + i as i64 * 1000,
            ))
            .await;
        let status = tracker.get_signal_status("sig-a").await.unwrap();
        assert!((status.mae_ratio - expected_mae).abs() < 1e-3, "mae at tick {i}");
        assert!((status.mfe_ratio - expected_mfe).abs() < 1e-3, "mfe at tick {i}");
        assert_eq!(status.outcome, "active");
    }

    tracker
        .process_trade(&trade("BTCUSDT", dec!(50200), 1_704_067_205_000))
        .await;
    assert_eq!(tracker.active_count().await, 0);
}

#[tokio::test]
async fn short_resolves_at_stop_loss_on_single_tick() {
    let tracker = PositionTracker::new(
        Arc::new(InMemorySignalStore::new()),
        Arc::new(InMemorySignalCache::new()),
    );

    let fast = FastSignal::new(
        "sig-b".into(),
        "ETHUSDT".into(),
        "5m".into(),
        1_704_067_200.0,
        msr_retest_capture::domain::signal::fast::DIRECTION_SHORT,
        3000.0,
        2988.0,
        3053.0,
    );
    tracker.add_signal(&fast_to_signal(&fast)).await.unwrap();

    tracker
        .process_trade(&trade("ETHUSDT", dec!(3053), 1_704_067_260_000))
        .await;

    assert_eq!(tracker.active_count().await, 0);
}

#[test]
fn three_minute_aggregation_preserves_mass() {
    let mut aggregator = KlineAggregator::new(vec![msr_retest_capture::domain::market::timeframe::Timeframe::ThreeMin]);

    let inputs = [
        FastCandle { timestamp: 0.0, open: 100.0, high: 102.0, low: 99.0, close: 101.0, volume: 10.0, is_closed: true },
        FastCandle { timestamp: 60.0, open: 101.0, high: 105.0, low: 100.0, close: 103.0, volume: 20.0, is_closed: true },
        FastCandle { timestamp: 120.0, open: 103.0, high: 104.0, low: 98.0, close: 99.0, volume: 15.0, is_closed: true },
    ];

    let mut emitted = Vec::new();
    for candle in inputs {
        emitted.extend(aggregator.add_1m("BTCUSDT", candle));
    }

    assert_eq!(emitted.len(), 1);
    let (_, agg) = &emitted[0];
    assert_eq!(agg.timestamp, 0.0);
    assert_eq!(agg.open, 100.0);
    assert_eq!(agg.close, 99.0);
    assert_eq!(agg.high, 105.0);
    assert_eq!(agg.low, 98.0);
    assert_eq!(agg.volume, 45.0);
}

#[test]
fn three_minute_aggregation_does_not_emit_early() {
    let mut aggregator = KlineAggregator::new(vec![msr_retest_capture::domain::market::timeframe::Timeframe::ThreeMin]);

    let inputs = [
        FastCandle { timestamp: 0.0, open: 100.0, high: 102.0, low: 99.0, close: 101.0, volume: 10.0, is_closed: true },
        FastCandle { timestamp: 60.0, open: 101.0, high: 105.0, low: 100.0, close: 103.0, volume: 20.0, is_closed: true },
    ];

    let mut emitted = Vec::new();
    for candle in inputs {
        emitted.extend(aggregator.add_1m("BTCUSDT", candle));
    }

    assert!(emitted.is_empty());
}

#[tokio::test]
async fn position_lock_suppresses_opposite_signal_until_released() {
    let mut strategy = MsrStrategy::new(config(), None)
        .with_signal_store(Arc::new(InMemorySignalStore::new()));

    let mut buffer = seeded_buffer();
    let short_candle = short_trigger_candle();
    let result = strategy.process_candle(&short_candle, "5m", &buffer).await;
    let signal = result.signal.expect("SHORT signal should fire on the retest candle");
    assert_eq!(signal.direction, Direction::Short);

    buffer.add(long_trigger_candle());
    let long_candle = long_trigger_candle();
    let result = strategy.process_candle(&long_candle, "5m", &buffer).await;
    assert!(
        result.signal.is_none(),
        "a second signal must not fire while the position is locked"
    );

    strategy.record_outcome(msr_retest_capture::domain::signal::signal::Outcome::Sl, "BTCUSDT", "5m").await;

    let result = strategy.process_candle(&long_candle, "5m", &buffer).await;
    let signal = result.signal.expect("LONG signal should fire once the lock is released");
    assert_eq!(signal.direction, Direction::Long);
}

struct FailFirstStore {
    store: InMemorySignalStore,
    calls: std::sync::atomic::AtomicUsize,
}

impl FailFirstStore {
    fn new() -> Self {
        Self {
            store: InMemorySignalStore::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl msr_retest_capture::domain::repositories::SignalStore for FailFirstStore {
    async fn save(&self, signal: &Signal) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n == 0 {
            anyhow::bail!("simulated store outage");
        }
        self.store.save(signal).await
    }

    async fn update_outcome(&self, signal: &Signal) -> anyhow::Result<()> {
        self.store.update_outcome(signal).await
    }

    async fn get_active(&self, symbol: Option<&str>) -> anyhow::Result<Vec<Signal>> {
        self.store.get_active(symbol).await
    }

    async fn get_stats(&self) -> anyhow::Result<msr_retest_capture::domain::repositories::SignalStats> {
        self.store.get_stats().await
    }
}

#[tokio::test]
async fn signal_save_failure_keeps_position_unlocked() {
    let mut strategy = MsrStrategy::new(config(), None).with_signal_store(Arc::new(FailFirstStore::new()));

    let buffer = seeded_buffer();
    let candle = short_trigger_candle();

    let result = strategy.process_candle(&candle, "5m", &buffer).await;
    assert!(result.signal.is_none(), "a failed save must not emit a signal");

    let result = strategy.process_candle(&candle, "5m", &buffer).await;
    assert!(result.signal.is_some(), "the retry on the same candle must succeed and emit");
}

#[tokio::test]
async fn replay_from_checkpoint_is_deterministic_across_independent_runs() {
    let candles: Vec<Candle> = (0..49)
        .map(flat_candle)
        .chain(std::iter::once(short_trigger_candle()))
        .collect();

    async fn run_once(candles: &[Candle]) -> Vec<Signal> {
        let candle_store = Arc::new(InMemoryCandleStore::new());
        candle_store.seed(candles.to_vec()).await;
        let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
        let signal_store = Arc::new(InMemorySignalStore::new());

        let replay = ReplayService::new(candle_store, checkpoint_store);
        replay.initialize_state("BTCUSDT", candles[0].timestamp - 1).await.unwrap();

        let mut aggregator = KlineAggregator::new(vec![]);
        let mut buffers: HashMap<(String, String), ColdCandleBuffer> = HashMap::new();
        let mut strategy = MsrStrategy::new(config(), None).with_signal_store(signal_store.clone());
        strategy.init().await.unwrap();

        replay
            .replay_from_checkpoint(
                "BTCUSDT",
                candles[0].timestamp - 1,
                &mut aggregator,
                &mut buffers,
                &mut strategy,
            )
            .await
            .unwrap();

        signal_store.get_active(Some("BTCUSDT")).await.unwrap()
    }

    let first = run_once(&candles).await;
    let second = run_once(&candles).await;

    assert_eq!(first.len(), second.len());
    assert!(!first.is_empty(), "the seeded history should produce the SHORT retest signal");
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.symbol, b.symbol);
        assert_eq!(a.timeframe, b.timeframe);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.entry_price, b.entry_price);
        assert_eq!(a.tp_price, b.tp_price);
        assert_eq!(a.sl_price, b.sl_price);
    }
}
