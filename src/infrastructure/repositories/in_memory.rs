//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the repository traits defined
//! in `domain::repositories`. Suitable for tests, replay, and the `status`
//! subcommand; not durable across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::checkpoint::ProcessingCheckpoint;
use crate::domain::market::candle::Candle;
use crate::domain::repositories::{
    CandleStore, CheckpointStore, SignalCache, SignalStats, SignalStore, StreakStore,
};
use crate::domain::signal::fast::FastSignal;
use crate::domain::signal::signal::{Outcome, Signal, StreakTracker};

/// In-memory `SignalStore`. Signals are keyed by id; `get_active` filters
/// on `Outcome::Active` at read time rather than maintaining a second index.
#[derive(Default)]
pub struct InMemorySignalStore {
    signals: Arc<RwLock<HashMap<String, Signal>>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn save(&self, signal: &Signal) -> Result<()> {
        self.signals
            .write()
            .await
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    async fn update_outcome(&self, signal: &Signal) -> Result<()> {
        let mut signals = self.signals.write().await;
        match signals.get_mut(&signal.id) {
            Some(existing) => {
                *existing = signal.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("no such signal: {}", signal.id)),
        }
    }

    async fn get_active(&self, symbol: Option<&str>) -> Result<Vec<Signal>> {
        let signals = self.signals.read().await;
        Ok(signals
            .values()
            .filter(|s| s.outcome == Outcome::Active)
            .filter(|s| symbol.is_none_or(|sym| s.symbol == sym))
            .cloned()
            .collect())
    }

    async fn get_stats(&self) -> Result<SignalStats> {
        let signals = self.signals.read().await;
        let mut stats = SignalStats::default();
        for signal in signals.values() {
            match signal.outcome {
                Outcome::Tp => stats.tp += 1,
                Outcome::Sl => stats.sl += 1,
                Outcome::Active => stats.active += 1,
            }
        }
        Ok(stats)
    }
}

/// In-memory `SignalCache`, mirroring `InMemorySignalStore` but over the
/// hot-path `FastSignal` representation.
#[derive(Default)]
pub struct InMemorySignalCache {
    signals: Arc<RwLock<HashMap<String, FastSignal>>>,
}

impl InMemorySignalCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalCache for InMemorySignalCache {
    async fn get_all_signals(&self) -> Result<Vec<FastSignal>> {
        Ok(self.signals.read().await.values().cloned().collect())
    }

    async fn cache_signal(&self, signal: &FastSignal) -> Result<()> {
        self.signals
            .write()
            .await
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    async fn update_signal(&self, signal: &FastSignal) -> Result<()> {
        self.signals
            .write()
            .await
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    async fn remove_signal(&self, signal_id: &str, _symbol: &str) -> Result<()> {
        self.signals.write().await.remove(signal_id);
        Ok(())
    }

    async fn sync_from_store(&self, signals: &[FastSignal]) -> Result<()> {
        let mut cache = self.signals.write().await;
        cache.clear();
        for signal in signals {
            cache.insert(signal.id.clone(), signal.clone());
        }
        Ok(())
    }
}

/// In-memory `StreakStore`, keyed by `"{symbol}_{timeframe}"`.
#[derive(Default)]
pub struct InMemoryStreakStore {
    streaks: Arc<RwLock<HashMap<String, StreakTracker>>>,
}

impl InMemoryStreakStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(symbol: &str, timeframe: &str) -> String {
        format!("{symbol}_{timeframe}")
    }
}

#[async_trait]
impl StreakStore for InMemoryStreakStore {
    async fn load(&self, symbol: &str, timeframe: &str) -> Result<Option<StreakTracker>> {
        Ok(self
            .streaks
            .read()
            .await
            .get(&Self::key(symbol, timeframe))
            .copied())
    }

    async fn save(&self, symbol: &str, timeframe: &str, streak: &StreakTracker) -> Result<()> {
        self.streaks
            .write()
            .await
            .insert(Self::key(symbol, timeframe), *streak);
        Ok(())
    }
}

/// In-memory `CheckpointStore`, one checkpoint per `(symbol, timeframe)`.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, ProcessingCheckpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(symbol: &str, timeframe: &str) -> String {
        format!("{symbol}_{timeframe}")
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, symbol: &str, timeframe: &str) -> Result<Option<ProcessingCheckpoint>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(&Self::key(symbol, timeframe))
            .cloned())
    }

    async fn save(&self, checkpoint: &ProcessingCheckpoint) -> Result<()> {
        self.checkpoints.write().await.insert(
            Self::key(&checkpoint.symbol, &checkpoint.timeframe),
            checkpoint.clone(),
        );
        Ok(())
    }
}

/// In-memory `CandleStore`, backed by an insertion-ordered `Vec` per
/// symbol. Intended for tests and replay fixtures, where the full history
/// is seeded up front via `seed`.
#[derive(Default)]
pub struct InMemoryCandleStore {
    candles: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, candles: Vec<Candle>) {
        let mut store = self.candles.write().await;
        for candle in candles {
            store.entry(candle.symbol.clone()).or_default().push(candle);
        }
        for symbol_candles in store.values_mut() {
            symbol_candles.sort_by_key(|c| c.timestamp);
        }
    }
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn load_since(&self, symbol: &str, since: i64) -> Result<Vec<Candle>> {
        let store = self.candles.read().await;
        Ok(store
            .get(symbol)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
