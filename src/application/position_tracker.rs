//! Tracks active signals and updates MAE/MFE from the live trade stream.
//!
//! Mirrors `MsrStrategy` in spirit (hexagonal, port-injected I/O) but runs
//! on the hot path: every trade print is checked against every active
//! signal for the same symbol, using `FastSignal`'s pure `f64` arithmetic.
//! Signals are converted to their cold-path `Signal` representation only
//! at the store/cache/listener boundary.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::market::candle::AggTrade;
use crate::domain::ports::OutcomeListener;
use crate::domain::repositories::{SignalCache, SignalStore};
use crate::domain::signal::converters::{aggtrade_to_fast, fast_to_signal, signal_to_fast};
use crate::domain::signal::fast::FastSignal;
use crate::domain::signal::signal::{Outcome, Signal};

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Point-in-time status snapshot for a single tracked signal.
#[derive(Debug, Clone)]
pub struct SignalStatus {
    pub id: String,
    pub symbol: String,
    pub direction: &'static str,
    pub entry_price: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub mae_ratio: f64,
    pub mfe_ratio: f64,
    pub outcome: String,
}

/// Tracks active signals (hot path `FastSignal`) and updates their MAE/MFE
/// as trades arrive, converting to the cold path only when persisting or
/// notifying listeners.
pub struct PositionTracker {
    update_interval_secs: f64,
    signal_store: Arc<dyn SignalStore>,
    signal_cache: Arc<dyn SignalCache>,
    active_signals: tokio::sync::RwLock<HashMap<String, Vec<FastSignal>>>,
    last_update: tokio::sync::RwLock<HashMap<String, f64>>,
    outcome_listeners: tokio::sync::RwLock<Vec<Arc<dyn OutcomeListener>>>,
    cache_stats: tokio::sync::RwLock<CacheStats>,
}

impl PositionTracker {
    pub fn new(signal_store: Arc<dyn SignalStore>, signal_cache: Arc<dyn SignalCache>) -> Self {
        Self::with_update_interval(signal_store, signal_cache, 1.0)
    }

    pub fn with_update_interval(
        signal_store: Arc<dyn SignalStore>,
        signal_cache: Arc<dyn SignalCache>,
        update_interval_secs: f64,
    ) -> Self {
        Self {
            update_interval_secs,
            signal_store,
            signal_cache,
            active_signals: tokio::sync::RwLock::new(HashMap::new()),
            last_update: tokio::sync::RwLock::new(HashMap::new()),
            outcome_listeners: tokio::sync::RwLock::new(Vec::new()),
            cache_stats: tokio::sync::RwLock::new(CacheStats::default()),
        }
    }

    /// Registers a listener for outcome (TP/SL) events. Re-registering the
    /// same `Arc` is a no-op.
    pub async fn on_outcome(&self, listener: Arc<dyn OutcomeListener>) {
        let mut listeners = self.outcome_listeners.write().await;
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Loads active signals from the cache; falls back to the store (and
    /// re-syncs the cache) on a cache miss.
    pub async fn load_active_signals(&self) -> anyhow::Result<()> {
        let mut active = self.active_signals.write().await;
        active.clear();

        let cached = self.signal_cache.get_all_signals().await?;

        if !cached.is_empty() {
            self.cache_stats.write().await.hits += 1;
            for signal in cached {
                active.entry(signal.symbol.clone()).or_default().push(signal);
            }
            let total: usize = active.values().map(|v| v.len()).sum();
            info!(total, "loaded active signals from cache");
        } else {
            self.cache_stats.write().await.misses += 1;
            let signals = self.signal_store.get_active(None).await?;
            for signal in &signals {
                let fast = signal_to_fast(signal);
                active.entry(fast.symbol.clone()).or_default().push(fast);
            }
            let total: usize = active.values().map(|v| v.len()).sum();
            info!(total, "loaded active signals from store");

            if total > 0 {
                let all: Vec<FastSignal> = active.values().flatten().cloned().collect();
                self.signal_cache.sync_from_store(&all).await?;
            }
        }

        Ok(())
    }

    /// Starts tracking a newly-emitted signal.
    pub async fn add_signal(&self, signal: &Signal) -> anyhow::Result<()> {
        let fast = signal_to_fast(signal);
        self.active_signals
            .write()
            .await
            .entry(fast.symbol.clone())
            .or_default()
            .push(fast.clone());
        self.signal_cache.cache_signal(&fast).await?;
        info!(id = %fast.id, symbol = %fast.symbol, "tracking new signal");
        Ok(())
    }

    /// Feeds one trade print to every active signal on its symbol, updating
    /// MAE/MFE and detecting TP/SL hits. I/O (store/cache writes, listener
    /// notification) happens outside the lock.
    pub async fn process_trade(&self, trade: &AggTrade) {
        let fast_trade = aggtrade_to_fast(trade);
        let symbol = trade.symbol.clone();

        let mut resolved = Vec::new();
        let mut due_for_update = Vec::new();

        {
            let mut active = self.active_signals.write().await;
            let Some(signals) = active.get_mut(&symbol) else {
                return;
            };

            let mut last_update = self.last_update.write().await;
            let mut still_active = Vec::with_capacity(signals.len());

            for mut signal in std::mem::take(signals) {
                let changed = signal.check_outcome(fast_trade.price, fast_trade.timestamp);
                if changed {
                    resolved.push(signal.clone());
                    last_update.remove(&signal.id);
                } else {
                    signal.update_mae(fast_trade.price);

                    let last = last_update.get(&signal.id).copied().unwrap_or(0.0);
                    if fast_trade.timestamp - last >= self.update_interval_secs {
                        due_for_update.push(signal.clone());
                        last_update.insert(signal.id.clone(), fast_trade.timestamp);
                    }

                    still_active.push(signal);
                }
            }

            *signals = still_active;
        }

        for signal in &resolved {
            self.handle_outcome(signal).await;
        }

        for signal in &due_for_update {
            if let Err(e) = self.update_signal_mae(signal).await {
                warn!(id = %signal.id, error = %e, "failed to update MAE/cache");
            }
        }
    }

    async fn handle_outcome(&self, signal: &FastSignal) {
        let direction = if signal.direction == crate::domain::signal::fast::DIRECTION_LONG {
            "LONG"
        } else {
            "SHORT"
        };
        info!(
            id = %signal.id, outcome = %signal.outcome, symbol = %signal.symbol, direction,
            entry = signal.entry_price, exit = ?signal.outcome_price,
            "signal resolved"
        );

        if let Err(e) = self.signal_cache.remove_signal(&signal.id, &signal.symbol).await {
            warn!(id = %signal.id, error = %e, "failed to remove resolved signal from cache");
        }

        let cold = fast_to_signal(signal);
        let outcome = cold.outcome;

        if let Err(e) = self.signal_store.update_outcome(&cold).await {
            error!(id = %signal.id, error = %e, "failed to persist resolved signal");
        }

        let listeners = self.outcome_listeners.read().await;
        for listener in listeners.iter() {
            listener.on_outcome(&cold, outcome).await;
        }
    }

    async fn update_signal_mae(&self, signal: &FastSignal) -> anyhow::Result<()> {
        let cold = fast_to_signal(signal);
        self.signal_store.update_outcome(&cold).await?;
        self.signal_cache.update_signal(signal).await?;
        Ok(())
    }

    /// Updates `max_atr` on every active signal matching `(symbol, timeframe)`.
    /// Called when a new candle closes and ATR is recalculated.
    pub async fn update_max_atr(&self, symbol: &str, timeframe: &str, current_atr: f64) {
        let mut active = self.active_signals.write().await;
        let Some(signals) = active.get_mut(symbol) else {
            return;
        };
        for signal in signals.iter_mut() {
            if signal.timeframe == timeframe && signal.is_active() {
                signal.update_max_atr(current_atr);
            }
        }
    }

    pub async fn get_active_signals(&self, symbol: Option<&str>) -> Vec<Signal> {
        let active = self.active_signals.read().await;
        let fast: Vec<FastSignal> = match symbol {
            Some(sym) => active.get(sym).cloned().unwrap_or_default(),
            None => active.values().flatten().cloned().collect(),
        };
        fast.iter().map(fast_to_signal).collect()
    }

    pub async fn get_signal_status(&self, signal_id: &str) -> Option<SignalStatus> {
        let active = self.active_signals.read().await;
        for signals in active.values() {
            for signal in signals {
                if signal.id == signal_id {
                    return Some(SignalStatus {
                        id: signal.id.clone(),
                        symbol: signal.symbol.clone(),
                        direction: if signal.direction == crate::domain::signal::fast::DIRECTION_LONG {
                            "LONG"
                        } else {
                            "SHORT"
                        },
                        entry_price: signal.entry_price,
                        tp_price: signal.tp_price,
                        sl_price: signal.sl_price,
                        mae_ratio: signal.mae_ratio,
                        mfe_ratio: signal.mfe_ratio,
                        outcome: signal.outcome.clone(),
                    });
                }
            }
        }
        None
    }

    pub async fn active_count(&self) -> usize {
        self.active_signals.read().await.values().map(|v| v.len()).sum()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        *self.cache_stats.read().await
    }
}
