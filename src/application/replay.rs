//! Replays historical 1-minute candles to restore system state after a
//! restart, so previously-running strategy instances see the same
//! sequence of closed candles they would have seen had the process never
//! stopped (signal determinism).
//!
//! Only 1-minute candles are replayed from storage; higher timeframes are
//! re-derived by feeding each 1m candle back through the aggregator, the
//! same path live candles take.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::application::market_data::candle_aggregator::KlineAggregator;
use crate::application::strategies::msr_retest::MsrStrategy;
use crate::domain::checkpoint::{CheckpointStatus, ProcessingCheckpoint};
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_buffer::ColdCandleBuffer;
use crate::domain::repositories::{CandleStore, CheckpointStore};
use crate::domain::signal::converters::{candle_to_fast, fast_to_candle};

/// Checkpoint progress every N replayed candles, so a crash mid-replay
/// only loses at most this many candles of determinism on the next run.
const CHECKPOINT_INTERVAL: usize = 100;

pub struct ReplayService {
    candle_store: Arc<dyn CandleStore>,
    checkpoint_store: Arc<dyn CheckpointStore>,
}

impl ReplayService {
    pub fn new(candle_store: Arc<dyn CandleStore>, checkpoint_store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            candle_store,
            checkpoint_store,
        }
    }

    pub async fn get_checkpoint_time(&self, symbol: &str) -> anyhow::Result<Option<i64>> {
        Ok(self
            .checkpoint_store
            .load(symbol, "1m")
            .await?
            .map(|c| c.checkpoint_time))
    }

    /// Restores a `ColdCandleBuffer` to its state as of `checkpoint_time`,
    /// loading up to `limit` candles at or before it. `checkpoint_time`'s
    /// own candle is included: it was already processed, but the next
    /// candle's indicators need it in the buffer for lookback context.
    pub async fn restore_buffer_state(
        &self,
        symbol: &str,
        timeframe: &str,
        checkpoint_time: i64,
        limit: usize,
    ) -> anyhow::Result<ColdCandleBuffer> {
        let candles = self.candle_store.load_since(symbol, 0).await?;
        let mut buffer = ColdCandleBuffer::with_max_size(symbol, timeframe, limit.max(1));

        for candle in candles
            .into_iter()
            .filter(|c| c.timestamp <= checkpoint_time)
        {
            buffer.add(candle);
        }

        info!(
            symbol, timeframe, len = buffer.len(), checkpoint_time,
            "restored buffer state"
        );
        Ok(buffer)
    }

    /// Replays every closed 1m candle after `checkpoint_time` for `symbol`,
    /// feeding it through `aggregator` and `strategy` for every target
    /// timeframe, with periodic checkpointing. Returns the number of 1m
    /// candles replayed.
    pub async fn replay_from_checkpoint(
        &self,
        symbol: &str,
        checkpoint_time: i64,
        aggregator: &mut KlineAggregator,
        buffers: &mut HashMap<(String, String), ColdCandleBuffer>,
        strategy: &mut MsrStrategy,
    ) -> anyhow::Result<usize> {
        let candles = self.candle_store.load_since(symbol, checkpoint_time).await?;

        if candles.is_empty() {
            info!(symbol, "no candles to replay");
            return Ok(0);
        }

        info!(
            symbol, count = candles.len(), from = checkpoint_time,
            to = candles.last().map(|c| c.timestamp),
            "replaying candles"
        );

        let system_start_time = match self.checkpoint_store.load(symbol, "1m").await? {
            Some(existing) => existing.system_start_time,
            None => Utc::now(),
        };

        self.checkpoint_store
            .save(&ProcessingCheckpoint {
                symbol: symbol.to_string(),
                timeframe: "1m".to_string(),
                checkpoint_time,
                status: CheckpointStatus::Pending,
                system_start_time,
            })
            .await?;

        let mut replayed = 0;
        let mut last_timestamp = checkpoint_time;

        for candle in &candles {
            self.process_one_candle(candle, "1m", aggregator, buffers, strategy)
                .await;

            let fast = candle_to_fast(candle);
            let aggregated = aggregator.add_1m(symbol, fast);
            for (timeframe, agg_fast) in aggregated {
                let agg_candle = fast_to_candle(symbol, &agg_fast);
                self.process_one_candle(
                    &agg_candle,
                    timeframe.to_binance_string(),
                    aggregator,
                    buffers,
                    strategy,
                )
                .await;
            }

            replayed += 1;
            last_timestamp = candle.timestamp;

            if replayed % CHECKPOINT_INTERVAL == 0 {
                self.checkpoint_store
                    .save(&ProcessingCheckpoint {
                        symbol: symbol.to_string(),
                        timeframe: "1m".to_string(),
                        checkpoint_time: last_timestamp,
                        status: CheckpointStatus::Pending,
                        system_start_time,
                    })
                    .await?;
                debug!(replayed, total = candles.len(), last_timestamp, "replay checkpoint");
            }
        }

        self.checkpoint_store
            .save(&ProcessingCheckpoint {
                symbol: symbol.to_string(),
                timeframe: "1m".to_string(),
                checkpoint_time: last_timestamp,
                status: CheckpointStatus::Confirmed,
                system_start_time,
            })
            .await?;

        info!(symbol, replayed, "replay complete");
        Ok(replayed)
    }

    async fn process_one_candle(
        &self,
        candle: &Candle,
        timeframe: &str,
        _aggregator: &mut KlineAggregator,
        buffers: &mut HashMap<(String, String), ColdCandleBuffer>,
        strategy: &mut MsrStrategy,
    ) {
        let key = (candle.symbol.clone(), timeframe.to_string());
        let buffer = buffers
            .entry(key)
            .or_insert_with(|| ColdCandleBuffer::new(candle.symbol.clone(), timeframe.to_string()));
        buffer.add(candle.clone());
        strategy.process_candle(candle, timeframe, buffer).await;
    }

    pub async fn initialize_state(
        &self,
        symbol: &str,
        initial_candle_time: i64,
    ) -> anyhow::Result<()> {
        self.checkpoint_store
            .save(&ProcessingCheckpoint {
                symbol: symbol.to_string(),
                timeframe: "1m".to_string(),
                checkpoint_time: initial_candle_time,
                status: CheckpointStatus::Confirmed,
                system_start_time: Utc::now(),
            })
            .await?;
        info!(symbol, initial_candle_time, "initialized processing state");
        Ok(())
    }

    /// Checks the given `(symbol, timeframe)` pairs for a checkpoint left
    /// in `Pending` status, meaning the previous run died mid-replay and
    /// recovery must resume the replay rather than trust the checkpoint's
    /// buffer state at face value.
    pub async fn check_pending_recovery(
        &self,
        keys: &[(String, String)],
    ) -> anyhow::Result<Vec<ProcessingCheckpoint>> {
        let mut pending = Vec::new();
        for (symbol, timeframe) in keys {
            if let Some(checkpoint) = self.checkpoint_store.load(symbol, timeframe).await? {
                if checkpoint.status == CheckpointStatus::Pending {
                    pending.push(checkpoint);
                }
            }
        }
        Ok(pending)
    }
}
