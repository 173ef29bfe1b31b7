//! Aggregates closed 1-minute candles into higher timeframes, purely by
//! accumulation count: a buffer drains as soon as it holds
//! `period_minutes` candles, regardless of any gaps in the incoming
//! timestamps. Operates on the hot path (`FastCandle`) since this runs on
//! every closed 1m candle.

use crate::domain::market::timeframe::Timeframe;
use crate::domain::signal::fast::FastCandle;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub type AggregatedCallback = Arc<dyn Fn(&str, Timeframe, &FastCandle) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct AggregationBuffer {
    candles: Vec<FastCandle>,
}

impl AggregationBuffer {
    fn add(&mut self, candle: FastCandle, period_minutes: usize) -> Option<FastCandle> {
        self.candles.push(candle);

        if self.candles.len() >= period_minutes {
            Some(self.aggregate(period_minutes))
        } else {
            None
        }
    }

    fn aggregate(&mut self, period_minutes: usize) -> FastCandle {
        let window = &self.candles[..period_minutes];

        let aggregated = FastCandle {
            timestamp: window[0].timestamp,
            open: window[0].open,
            high: window.iter().map(|c| c.high).fold(f64::MIN, f64::max),
            low: window.iter().map(|c| c.low).fold(f64::MAX, f64::min),
            close: window[period_minutes - 1].close,
            volume: window.iter().map(|c| c.volume).sum(),
            is_closed: true,
        };

        self.candles.drain(0..period_minutes);
        aggregated
    }

    fn reset(&mut self) {
        self.candles.clear();
    }
}

/// Aggregates 1-minute candles into a configurable set of target
/// timeframes for every symbol it sees.
pub struct KlineAggregator {
    target_timeframes: Vec<Timeframe>,
    buffers: HashMap<(String, Timeframe), AggregationBuffer>,
    current_1m: HashMap<String, FastCandle>,
    callbacks: Vec<AggregatedCallback>,
}

impl KlineAggregator {
    pub fn new(target_timeframes: Vec<Timeframe>) -> Self {
        let target_timeframes = target_timeframes
            .into_iter()
            .filter(|tf| *tf != Timeframe::OneMin)
            .collect();

        Self {
            target_timeframes,
            buffers: HashMap::new(),
            current_1m: HashMap::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn default_timeframes() -> Vec<Timeframe> {
        vec![
            Timeframe::ThreeMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
        ]
    }

    /// Registers a callback invoked once per completed aggregated candle.
    /// A callback is only ever registered once: re-registering the same
    /// `Arc` pointer is a no-op.
    pub fn on_aggregated_kline(&mut self, callback: AggregatedCallback) {
        if !self.callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            self.callbacks.push(callback);
        }
    }

    fn period_start(timestamp: f64, period_minutes: usize) -> f64 {
        let period_seconds = (period_minutes * 60) as f64;
        (timestamp / period_seconds).floor() * period_seconds
    }

    /// Feeds one 1m candle, open or closed. `current_1m` is updated
    /// unconditionally so `get_current_1m` always reflects the latest
    /// print. An open candle only updates that map and returns empty;
    /// aggregation only advances on a closed candle.
    pub fn add_1m(&mut self, symbol: &str, candle: FastCandle) -> Vec<(Timeframe, FastCandle)> {
        self.current_1m.insert(symbol.to_string(), candle);

        if !candle.is_closed {
            return Vec::new();
        }

        let mut completed = Vec::new();

        for &timeframe in &self.target_timeframes {
            let period_minutes = timeframe.to_minutes();
            let key = (symbol.to_string(), timeframe);
            let buffer = self.buffers.entry(key).or_default();

            if let Some(aggregated) = buffer.add(candle, period_minutes) {
                debug!(symbol, ?timeframe, timestamp = aggregated.timestamp, "aggregated candle closed");
                completed.push((timeframe, aggregated));
            }
        }

        for (timeframe, candle) in &completed {
            for callback in &self.callbacks {
                callback(symbol, *timeframe, candle);
            }
        }

        if completed.is_empty() {
            Vec::new()
        } else {
            completed
        }
    }

    pub fn get_current_1m(&self, symbol: &str) -> Option<&FastCandle> {
        self.current_1m.get(symbol)
    }

    /// Non-mutating view of the in-progress candle for `(symbol, timeframe)`,
    /// useful for dashboards that want to show the current bar before it closes.
    pub fn partial(&self, symbol: &str, timeframe: Timeframe) -> Option<FastCandle> {
        let buffer = self.buffers.get(&(symbol.to_string(), timeframe))?;
        if buffer.candles.is_empty() {
            return None;
        }

        Some(FastCandle {
            timestamp: buffer.candles[0].timestamp,
            open: buffer.candles[0].open,
            high: buffer.candles.iter().map(|c| c.high).fold(f64::MIN, f64::max),
            low: buffer.candles.iter().map(|c| c.low).fold(f64::MAX, f64::min),
            close: buffer.candles.last().unwrap().close,
            volume: buffer.candles.iter().map(|c| c.volume).sum(),
            is_closed: false,
        })
    }

    /// Resets aggregation state for `symbol`, or everything if `None`.
    pub fn reset(&mut self, symbol: Option<&str>) {
        match symbol {
            Some(sym) => {
                for (key, buffer) in self.buffers.iter_mut() {
                    if key.0 == sym {
                        buffer.reset();
                    }
                }
                self.current_1m.remove(sym);
            }
            None => {
                for buffer in self.buffers.values_mut() {
                    buffer.reset();
                }
                self.current_1m.clear();
            }
        }
    }

    /// Seeds aggregation buffers from historical 1m candles so a live feed
    /// picks up aligned with the correct in-progress period instead of
    /// restarting at whatever minute it happens to connect on. Only the
    /// candles belonging to the period containing the *last* historical
    /// candle are kept (the rest of the window is already closed history,
    /// not something to re-aggregate).
    pub fn prefill_from_history(&mut self, symbol: &str, candles_1m: &[FastCandle]) {
        if candles_1m.is_empty() {
            warn!(symbol, "prefill called with empty history");
            return;
        }

        for &timeframe in &self.target_timeframes.clone() {
            let period_minutes = timeframe.to_minutes();
            let key = (symbol.to_string(), timeframe);
            let buffer = self.buffers.entry(key).or_default();
            buffer.reset();

            let last_timestamp = candles_1m.last().unwrap().timestamp;
            let period_start = Self::period_start(last_timestamp, period_minutes);

            for candle in candles_1m {
                if candle.timestamp >= period_start {
                    buffer.candles.push(*candle);
                }
            }
        }
    }
}

impl std::fmt::Debug for KlineAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlineAggregator")
            .field("target_timeframes", &self.target_timeframes)
            .field("symbols", &self.current_1m.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: f64, close: f64) -> FastCandle {
        FastCandle {
            timestamp: ts,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 100.0,
            is_closed: true,
        }
    }

    #[test]
    fn aggregates_5min_candles() {
        let mut agg = KlineAggregator::new(vec![Timeframe::FiveMin]);
        let base = 1704067200.0;

        for i in 0..5i64 {
            let c = candle(base + (i * 60) as f64, 100.0 + i as f64);
            let completed = agg.add_1m("BTCUSDT", c);

            if i < 4 {
                assert!(completed.is_empty());
            } else {
                assert_eq!(completed.len(), 1);
                let (tf, aggregated) = &completed[0];
                assert_eq!(*tf, Timeframe::FiveMin);
                assert_eq!(aggregated.open, 100.0);
                assert_eq!(aggregated.close, 104.0);
                assert_eq!(aggregated.high, 105.0);
                assert_eq!(aggregated.low, 98.0);
                assert_eq!(aggregated.volume, 500.0);
            }
        }
    }

    #[test]
    fn multiple_timeframes_close_independently() {
        let mut agg = KlineAggregator::new(vec![Timeframe::ThreeMin, Timeframe::FiveMin]);
        let base = 1704067200.0;

        let mut closed_3m = 0;
        let mut closed_5m = 0;

        for i in 0..15i64 {
            let c = candle(base + (i * 60) as f64, 100.0);
            for (tf, _) in agg.add_1m("BTCUSDT", c) {
                match tf {
                    Timeframe::ThreeMin => closed_3m += 1,
                    Timeframe::FiveMin => closed_5m += 1,
                    _ => unreachable!(),
                }
            }
        }

        assert_eq!(closed_3m, 5);
        assert_eq!(closed_5m, 3);
    }

    #[test]
    fn partial_is_non_mutating() {
        let mut agg = KlineAggregator::new(vec![Timeframe::FiveMin]);
        let base = 1704067200.0;

        for i in 0..3i64 {
            agg.add_1m("BTCUSDT", candle(base + (i * 60) as f64, 100.0 + i as f64));
        }

        let partial1 = agg.partial("BTCUSDT", Timeframe::FiveMin).unwrap();
        let partial2 = agg.partial("BTCUSDT", Timeframe::FiveMin).unwrap();
        assert_eq!(partial1, partial2);
        assert_eq!(partial1.close, 102.0);
        assert!(!partial1.high.is_nan());
    }

    #[test]
    fn open_candle_updates_current_only_and_emits_nothing() {
        let mut agg = KlineAggregator::new(vec![Timeframe::FiveMin]);
        let base = 1704067200.0;

        let mut open_candle = candle(base, 100.0);
        open_candle.is_closed = false;
        let completed = agg.add_1m("BTCUSDT", open_candle);

        assert!(completed.is_empty());
        assert_eq!(agg.get_current_1m("BTCUSDT").unwrap().close, 100.0);
        assert!(agg.partial("BTCUSDT", Timeframe::FiveMin).is_none());
    }

    #[test]
    fn reset_clears_buffers_for_symbol() {
        let mut agg = KlineAggregator::new(vec![Timeframe::FiveMin]);
        let base = 1704067200.0;
        agg.add_1m("BTCUSDT", candle(base, 100.0));
        agg.reset(Some("BTCUSDT"));

        assert!(agg.partial("BTCUSDT", Timeframe::FiveMin).is_none());
        assert!(agg.get_current_1m("BTCUSDT").is_none());
    }

    #[test]
    fn prefill_keeps_only_the_last_incomplete_period() {
        let mut agg = KlineAggregator::new(vec![Timeframe::FiveMin]);
        let base = 1704067200.0;

        // 7 minutes of history: minutes 0-4 close a 5m candle, 5-6 are partial.
        let history: Vec<_> = (0..7i64)
            .map(|i| candle(base + (i * 60) as f64, 100.0 + i as f64))
            .collect();

        agg.prefill_from_history("BTCUSDT", &history);

        let partial = agg.partial("BTCUSDT", Timeframe::FiveMin).unwrap();
        assert_eq!(partial.timestamp, base + 300.0);
        assert_eq!(partial.close, 106.0);
    }
}
