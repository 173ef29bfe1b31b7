//! Repository Pattern Abstractions
//!
//! This module defines the store/cache ports the application layer talks
//! to. Concrete database and cache products are out of scope for this
//! crate; the only implementation shipped is the in-memory one under
//! `infrastructure::repositories::in_memory`, used for tests, replay, and
//! the `status`/`replay` CLI subcommands.
//!
//! # Design
//!
//! - `SignalStore` persists resolved and in-flight signals.
//! - `SignalCache` is a fast-access mirror of active signals, kept in sync
//!   with the store on the same write path (see `application::position_tracker`).
//! - `StreakStore` persists the per-`(symbol, timeframe)` win/loss streak.
//! - `CheckpointStore` persists replay checkpoints.
//! - `CandleStore` supplies historical 1-minute candles for prefill and
//!   replay.
//!
//! # Future
//!
//! These traits are designed so a real database/cache pairing can
//! implement them without the application layer changing.
//!
//! # Example
//!
//! ```rust,no_run
//! use msr_retest_capture::domain::repositories::SignalStore;
//! use msr_retest_capture::infrastructure::repositories::in_memory::InMemorySignalStore;
//!
//! # async {
//! let store = InMemorySignalStore::new();
//! // store.save(&signal).await?;
//! // let active = store.get_active(None).await?;
//! # };
//! ```

use crate::domain::checkpoint::ProcessingCheckpoint;
use crate::domain::market::candle::Candle;
use crate::domain::signal::fast::FastSignal;
use crate::domain::signal::signal::{Signal, StreakTracker};
use anyhow::Result;
use async_trait::async_trait;

/// Counts of signals by outcome, across every symbol and timeframe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub tp: usize,
    pub sl: usize,
    pub active: usize,
}

/// Persists resolved and in-flight signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn save(&self, signal: &Signal) -> Result<()>;

    async fn update_outcome(&self, signal: &Signal) -> Result<()>;

    /// All signals still `active`, optionally filtered by symbol.
    async fn get_active(&self, symbol: Option<&str>) -> Result<Vec<Signal>>;

    /// Count of TP, SL, and still-active signals.
    async fn get_stats(&self) -> Result<SignalStats>;
}

/// Fast-access mirror of active signals, kept in sync with `SignalStore`.
#[async_trait]
pub trait SignalCache: Send + Sync {
    async fn get_all_signals(&self) -> Result<Vec<FastSignal>>;

    async fn cache_signal(&self, signal: &FastSignal) -> Result<()>;

    async fn update_signal(&self, signal: &FastSignal) -> Result<()>;

    async fn remove_signal(&self, signal_id: &str, symbol: &str) -> Result<()>;

    async fn sync_from_store(&self, signals: &[FastSignal]) -> Result<()>;
}

/// Persists the win/loss streak per `(symbol, timeframe)`.
#[async_trait]
pub trait StreakStore: Send + Sync {
    async fn load(&self, symbol: &str, timeframe: &str) -> Result<Option<StreakTracker>>;

    async fn save(&self, symbol: &str, timeframe: &str, streak: &StreakTracker) -> Result<()>;
}

/// Persists replay checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, symbol: &str, timeframe: &str) -> Result<Option<ProcessingCheckpoint>>;

    async fn save(&self, checkpoint: &ProcessingCheckpoint) -> Result<()>;
}

/// Supplies historical 1-minute candles for prefill and replay.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Candles for `symbol` with `timestamp > since` (exclusive), in
    /// ascending timestamp order.
    async fn load_since(&self, symbol: &str, since: i64) -> Result<Vec<Candle>>;
}
