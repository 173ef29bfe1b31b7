//! MSR Retest Capture strategy: closed-candle support/resistance retest
//! detection on trend-following setups.
//!
//! Strategy logic:
//! - Uptrend (close > ema50) + touch support + bullish reversal -> SHORT
//! - Downtrend (close < ema50) + touch resistance + bearish reversal -> LONG
//!
//! TP/SL: TP distance = ATR x tp_mult (narrow), SL distance = ATR x sl_mult
//! (wide). Only one open position per `(symbol, timeframe)` at a time.
//!
//! All I/O is injected via repository ports (`SignalStore`, `StreakStore`)
//! and `SignalListener` callbacks, so this module stays pure business
//! logic usable from both live processing and replay.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, error, info, warn};

use crate::application::strategies::atr_tracker::AtrPercentileTracker;
use crate::config::strategy_config::StrategyConfig;
use crate::domain::indicators::{self, IndicatorSnapshot};
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_buffer::ColdCandleBuffer;
use crate::domain::ports::SignalListener;
use crate::domain::repositories::{SignalStore, StreakStore};
use crate::domain::signal::signal::{Direction, Outcome, Signal, StreakTracker};

const MIN_SCORE_THRESHOLD: Decimal = Decimal::from_parts(10, 0, 0, false, 1);
const MIN_BUFFER_LEN: usize = 50;
const STRATEGY_NAME: &str = "msr_retest_capture";

/// Outcome of feeding one closed candle through the strategy.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub signal: Option<Signal>,
    pub atr: Option<Decimal>,
}

fn symbol_key(symbol: &str, timeframe: &str) -> (String, String) {
    (symbol.to_string(), timeframe.to_string())
}

pub struct MsrStrategy {
    config: StrategyConfig,
    atr_tracker: Option<AtrPercentileTracker>,
    streak_trackers: HashMap<(String, String), StreakTracker>,
    active_positions: HashSet<(String, String)>,
    signal_store: Option<Arc<dyn SignalStore>>,
    streak_store: Option<Arc<dyn StreakStore>>,
    listeners: Vec<Arc<dyn SignalListener>>,
    initialized: bool,
}

impl MsrStrategy {
    pub fn new(config: StrategyConfig, atr_tracker: Option<AtrPercentileTracker>) -> Self {
        if !config.filters.is_empty() {
            let enabled: Vec<String> = config
                .filters
                .values()
                .filter(|f| f.enabled)
                .map(|f| {
                    format!(
                        "{} {} streak[{},{}] ATR>{:.0}%",
                        f.symbol,
                        f.timeframe,
                        f.streak_lo,
                        f.streak_hi,
                        f.atr_pct_threshold * 100.0
                    )
                })
                .collect();
            info!(filters = %enabled.join(", "), "signal filters enabled");
        }

        Self {
            config,
            atr_tracker,
            streak_trackers: HashMap::new(),
            active_positions: HashSet::new(),
            signal_store: None,
            streak_store: None,
            listeners: Vec::new(),
            initialized: false,
        }
    }

    pub fn with_signal_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.signal_store = Some(store);
        self
    }

    pub fn with_streak_store(mut self, store: Arc<dyn StreakStore>) -> Self {
        self.streak_store = Some(store);
        self
    }

    /// Loads per-`(symbol, timeframe)` streak trackers and currently-active
    /// signals, seeding this strategy's in-memory state before it starts
    /// processing the live stream. Idempotent.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        if self.initialized {
            return Ok(());
        }

        if let Some(streak_store) = &self.streak_store {
            for symbol in &self.config.symbols.clone() {
                for timeframe in &self.config.timeframes.clone() {
                    if let Some(tracker) = streak_store.load(symbol, timeframe).await? {
                        self.streak_trackers
                            .insert(symbol_key(symbol, timeframe), tracker);
                    }
                }
            }
            info!(count = self.streak_trackers.len(), "loaded streak trackers");
        }

        if let Some(signal_store) = &self.signal_store {
            let active = signal_store.get_active(None).await?;
            for signal in &active {
                self.active_positions
                    .insert(symbol_key(&signal.symbol, &signal.timeframe));
            }
            info!(count = active.len(), "loaded active positions");
        }

        self.initialized = true;
        Ok(())
    }

    /// Registers a listener for newly-emitted signals. Re-registering the
    /// same `Arc` is a no-op.
    pub fn on_signal(&mut self, listener: Arc<dyn SignalListener>) {
        if !self.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    fn get_streak(&mut self, symbol: &str, timeframe: &str) -> StreakTracker {
        *self
            .streak_trackers
            .entry(symbol_key(symbol, timeframe))
            .or_default()
    }

    /// TP distance = ATR x `tp_atr_mult`, SL distance = ATR x `sl_atr_mult`.
    /// LONG: `tp = min(entry + tp_distance, high + atr)`, `sl = entry - sl_distance`.
    /// SHORT: `tp = max(entry - tp_distance, low - atr)`, `sl = entry + sl_distance`.
    pub fn calculate_tp_sl(
        &self,
        direction: Direction,
        entry_price: Decimal,
        atr_value: Decimal,
        high: Decimal,
        low: Decimal,
    ) -> (Decimal, Decimal) {
        let tp_distance = atr_value * self.config.tp_atr_mult;
        let sl_distance = atr_value * self.config.sl_atr_mult;

        match direction {
            Direction::Long => {
                let tp_raw = entry_price + tp_distance;
                let tp_limit = high + atr_value;
                (tp_raw.min(tp_limit), entry_price - sl_distance)
            }
            Direction::Short => {
                let tp_raw = entry_price - tp_distance;
                let tp_limit = low - atr_value;
                (tp_raw.max(tp_limit), entry_price + sl_distance)
            }
        }
    }

    /// Detects whether `candle` (on `timeframe`) produces a signal, given
    /// the previous closed candle (for level-touch detection) and the
    /// indicator snapshot computed from the buffer ending at `candle`.
    pub fn detect_signal(
        &mut self,
        candle: &Candle,
        timeframe: &str,
        prev_candle: Option<&Candle>,
        indicators: &IndicatorSnapshot,
    ) -> Option<Signal> {
        let close = candle.close;
        let open = candle.open;
        let high = candle.high;
        let low = candle.low;
        let prev_low = prev_candle.map_or(low, |c| c.low);
        let prev_high = prev_candle.map_or(high, |c| c.high);

        let levels = [
            indicators.fib.level_382,
            indicators.fib.level_500,
            indicators.fib.level_618,
            indicators.vwap,
        ];
        let (support_levels, resistance_levels): (Vec<Decimal>, Vec<Decimal>) =
            levels.iter().partition(|&&level| level <= close);

        let nearest_support = support_levels.iter().copied().max();
        let nearest_resistance = resistance_levels.iter().copied().min();

        let (support_score, support_count) = level_score(close, &support_levels);
        let (resistance_score, resistance_count) = level_score(close, &resistance_levels);

        let uptrend = close > indicators.ema;
        let downtrend = close < indicators.ema;
        let is_bullish = close > open;
        let is_bearish = close < open;

        if uptrend && support_count >= 1 && support_score >= MIN_SCORE_THRESHOLD {
            if let Some(nearest_support) = nearest_support {
                let touched_support = low <= nearest_support || prev_low <= nearest_support;
                if touched_support && is_bullish {
                    let (tp_price, sl_price) =
                        self.calculate_tp_sl(Direction::Short, close, indicators.atr, high, low);
                    let streak = self.get_streak(&candle.symbol, timeframe);
                    info!(
                        symbol = %candle.symbol, price = %close, tp = %tp_price, sl = %sl_price,
                        "SHORT signal"
                    );
                    return Some(self.build_signal(
                        candle,
                        timeframe,
                        Direction::Short,
                        tp_price,
                        sl_price,
                        indicators.atr,
                        streak,
                    ));
                }
            }
        } else if downtrend && resistance_count >= 1 && resistance_score >= MIN_SCORE_THRESHOLD {
            if let Some(nearest_resistance) = nearest_resistance {
                let touched_resistance = high >= nearest_resistance || prev_high >= nearest_resistance;
                if touched_resistance && is_bearish {
                    let (tp_price, sl_price) =
                        self.calculate_tp_sl(Direction::Long, close, indicators.atr, high, low);
                    let streak = self.get_streak(&candle.symbol, timeframe);
                    info!(
                        symbol = %candle.symbol, price = %close, tp = %tp_price, sl = %sl_price,
                        "LONG signal"
                    );
                    return Some(self.build_signal(
                        candle,
                        timeframe,
                        Direction::Long,
                        tp_price,
                        sl_price,
                        indicators.atr,
                        streak,
                    ));
                }
            }
        }

        None
    }

    #[allow(clippy::too_many_arguments)]
    fn build_signal(
        &self,
        candle: &Candle,
        timeframe: &str,
        direction: Direction,
        tp_price: Decimal,
        sl_price: Decimal,
        atr_value: Decimal,
        streak: StreakTracker,
    ) -> Signal {
        use chrono::{TimeZone, Utc};

        Signal {
            id: crate::domain::signal::fast::generate_signal_id(),
            strategy: STRATEGY_NAME.to_string(),
            symbol: candle.symbol.clone(),
            timeframe: timeframe.to_string(),
            signal_time: Utc
                .timestamp_millis_opt(candle.timestamp)
                .single()
                .unwrap_or_else(Utc::now),
            direction,
            entry_price: candle.close,
            tp_price,
            sl_price,
            atr_at_signal: atr_value,
            streak_at_signal: streak.current_streak,
            mae_ratio: Decimal::ZERO,
            mfe_ratio: Decimal::ZERO,
            max_atr: atr_value,
            outcome: Outcome::Active,
            outcome_price: None,
            outcome_time: None,
        }
    }

    /// Whether `signal` passes the configured quality filter. No filters
    /// configured means every signal passes (backward compatible with a
    /// plain backtest run).
    pub fn passes_filter(&self, signal: &Signal, atr_value: Decimal) -> bool {
        if self.config.filters.is_empty() {
            return true;
        }

        let key = format!("{}_{}", signal.symbol, signal.timeframe);
        let Some(filter) = self.config.filters.get(&key) else {
            return false;
        };
        if !filter.enabled {
            return false;
        }

        let streak = signal.streak_at_signal();
        if !(filter.streak_lo <= streak && streak <= filter.streak_hi) {
            debug!(
                symbol = %signal.symbol, timeframe = %signal.timeframe, streak,
                "filter reject: streak out of range"
            );
            return false;
        }

        if filter.atr_pct_threshold > 0.0 {
            let Some(tracker) = &self.atr_tracker else {
                warn!(
                    symbol = %signal.symbol, timeframe = %signal.timeframe,
                    "filter reject: atr_pct_threshold set but no tracker registered"
                );
                return false;
            };

            let atr_f64 = atr_value.to_f64().unwrap_or(0.0);
            let Some(pct) = tracker.get_percentile(&signal.symbol, &signal.timeframe, atr_f64) else {
                debug!(symbol = %signal.symbol, timeframe = %signal.timeframe, "filter reject: insufficient ATR history");
                return false;
            };

            if pct <= filter.atr_pct_threshold {
                debug!(symbol = %signal.symbol, timeframe = %signal.timeframe, pct, "filter reject: ATR percentile too low");
                return false;
            }
        }

        true
    }

    /// Processes one closed candle against the rolling `buffer` (which
    /// must already include `candle` as its last entry). Needs at least
    /// `MIN_BUFFER_LEN` candles for the indicators to be defined.
    pub async fn process_candle(
        &mut self,
        candle: &Candle,
        timeframe: &str,
        buffer: &ColdCandleBuffer,
    ) -> ProcessResult {
        if buffer.len() < MIN_BUFFER_LEN {
            return ProcessResult::default();
        }

        let highs = buffer.highs();
        let lows = buffer.lows();
        let closes = buffer.closes();
        let volumes = buffer.volumes();

        let Some(snapshot) = indicators::calculate_latest(
            &highs,
            &lows,
            &closes,
            &volumes,
            self.config.ema_period,
            self.config.atr_period,
            self.config.fib_period,
        ) else {
            return ProcessResult::default();
        };

        // Track ATR history for percentile calculation on every closed
        // candle, not only when a signal fires -- otherwise the sample is
        // biased toward signal-adjacent volatility.
        if let Some(tracker) = &mut self.atr_tracker {
            tracker.update(&candle.symbol, timeframe, snapshot.atr.to_f64().unwrap_or(0.0));
        }

        let prev_candle = buffer.previous().cloned();
        let key = symbol_key(&candle.symbol, timeframe);

        if self.active_positions.contains(&key) {
            return ProcessResult {
                signal: None,
                atr: Some(snapshot.atr),
            };
        }

        let Some(mut signal) =
            self.detect_signal(candle, timeframe, prev_candle.as_ref(), &snapshot)
        else {
            return ProcessResult {
                signal: None,
                atr: Some(snapshot.atr),
            };
        };

        if !self.passes_filter(&signal, snapshot.atr) {
            return ProcessResult {
                signal: None,
                atr: Some(snapshot.atr),
            };
        }

        if let Some(store) = &self.signal_store {
            if let Err(e) = store.save(&signal).await {
                error!(
                    signal_id = %signal.id, error = %e,
                    "failed to save signal, signal will not be tracked"
                );
                return ProcessResult {
                    signal: None,
                    atr: Some(snapshot.atr),
                };
            }
        }

        // Mark position active only after a successful save.
        self.active_positions.insert(key);

        for listener in &self.listeners {
            listener.on_signal(&signal).await;
        }

        signal.outcome = Outcome::Active;
        ProcessResult {
            signal: Some(signal),
            atr: Some(snapshot.atr),
        }
    }

    /// Records a resolved outcome, updates the streak tracker, persists it,
    /// and releases the position lock for `(symbol, timeframe)`.
    pub async fn record_outcome(&mut self, outcome: Outcome, symbol: &str, timeframe: &str) {
        let key = symbol_key(symbol, timeframe);
        let mut tracker = self.get_streak(symbol, timeframe);
        tracker.record(outcome);
        self.streak_trackers.insert(key, tracker);

        if let Some(store) = &self.streak_store {
            if let Err(e) = store.save(symbol, timeframe, &tracker).await {
                error!(symbol, timeframe, error = %e, "failed to persist streak");
            }
        }

        debug!(
            symbol, timeframe,
            streak = tracker.current_streak, wins = tracker.total_wins, losses = tracker.total_losses,
            "updated streak"
        );

        self.release_position(symbol, timeframe);
    }

    /// Releases the position lock for `(symbol, timeframe)`. Call this when
    /// a position is closed externally (e.g. by the position tracker).
    pub fn release_position(&mut self, symbol: &str, timeframe: &str) {
        if self.active_positions.remove(&symbol_key(symbol, timeframe)) {
            debug!(symbol, timeframe, "released position lock");
        }
    }
}

/// Level score over a set of levels on one side of `close`:
/// `Σ 1 / (1 + |close - level| / close * 100)`. Returns `(score, count)`.
fn level_score(close: Decimal, levels: &[Decimal]) -> (Decimal, usize) {
    if close == Decimal::ZERO {
        return (Decimal::ZERO, levels.len());
    }

    let score = levels
        .iter()
        .map(|level| {
            let distance_pct = (close - level).abs() / close * Decimal::from(100);
            Decimal::ONE / (Decimal::ONE + distance_pct)
        })
        .sum();

    (score, levels.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicators::FibonacciLevels;
    use rust_decimal_macros::dec;

    fn base_config() -> StrategyConfig {
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

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            symbol: "BTCUSDT".into(),
            open,
            high,
            low,
            close,
            volume: dec!(100),
            timestamp: 1704067200000,
            is_closed: true,
        }
    }

    #[test]
    fn calculate_tp_sl_long_respects_high_plus_atr_cap() {
        let strategy = MsrStrategy::new(base_config(), None);
        let (tp, sl) =
            strategy.calculate_tp_sl(Direction::Long, dec!(100), dec!(5), dec!(103), dec!(95));
        // tp_distance = 10, tp_raw = 110, tp_limit = high+atr = 108 -> min = 108
        assert_eq!(tp, dec!(108));
        assert_eq!(sl, dec!(100) - dec!(5) * dec!(8.84));
    }

    #[test]
    fn calculate_tp_sl_short_respects_low_minus_atr_cap() {
        let strategy = MsrStrategy::new(base_config(), None);
        let (tp, sl) =
            strategy.calculate_tp_sl(Direction::Short, dec!(100), dec!(5), dec!(105), dec!(97));
        // tp_distance = 10, tp_raw = 90, tp_limit = low-atr = 92 -> max = 92
        assert_eq!(tp, dec!(92));
        assert_eq!(sl, dec!(100) + dec!(5) * dec!(8.84));
    }

    #[test]
    fn level_score_sums_proximity_weights() {
        let (score, count) = level_score(dec!(100), &[dec!(99), dec!(98)]);
        assert_eq!(count, 2);
        assert!(score > Decimal::ZERO);
    }

    #[test]
    fn detect_signal_short_on_support_retest() {
        let mut strategy = MsrStrategy::new(base_config(), None);
        let c = candle(dec!(99), dec!(101), dec!(97.5), dec!(100));
        let indicators = IndicatorSnapshot {
            ema: dec!(90), // close > ema -> uptrend
            atr: dec!(2),
            fib: FibonacciLevels {
                level_382: dec!(98),
                level_500: dec!(97),
                level_618: dec!(96),
            },
            vwap: dec!(99.5),
        };
        let signal = strategy.detect_signal(&c, "5m", None, &indicators);
        assert!(signal.is_some());
        let signal = signal.unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.timeframe, "5m");
        assert_eq!(signal.atr_at_signal, dec!(2));
    }

    #[test]
    fn detect_signal_long_on_resistance_retest() {
        let mut strategy = MsrStrategy::new(base_config(), None);
        let c = candle(dec!(101), dec!(102.5), dec!(99), dec!(100));
        let indicators = IndicatorSnapshot {
            ema: dec!(110), // close < ema -> downtrend
            atr: dec!(2),
            fib: FibonacciLevels {
                level_382: dec!(102),
                level_500: dec!(103),
                level_618: dec!(104),
            },
            vwap: dec!(100.5),
        };
        let signal = strategy.detect_signal(&c, "5m", None, &indicators);
        assert!(signal.is_some());
        assert_eq!(signal.unwrap().direction, Direction::Long);
    }

    #[test]
    fn detect_signal_none_without_trend_or_touch() {
        let mut strategy = MsrStrategy::new(base_config(), None);
        let c = candle(dec!(100), dec!(101), dec!(99.9), dec!(100.5));
        let indicators = IndicatorSnapshot {
            ema: dec!(100.4), // barely an uptrend, but no level touched
            atr: dec!(2),
            fib: FibonacciLevels {
                level_382: dec!(10),
                level_500: dec!(9),
                level_618: dec!(8),
            },
            vwap: dec!(9.5),
        };
        assert!(strategy.detect_signal(&c, "5m", None, &indicators).is_none());
    }

    #[tokio::test]
    async fn passes_filter_with_no_filters_configured() {
        let strategy = MsrStrategy::new(base_config(), None);
        let signal = Signal {
            id: "s1".into(),
            strategy: STRATEGY_NAME.into(),
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            signal_time: chrono::Utc::now(),
            direction: Direction::Long,
            entry_price: dec!(100),
            tp_price: dec!(110),
            sl_price: dec!(90),
            atr_at_signal: dec!(2),
            streak_at_signal: 0,
            mae_ratio: Decimal::ZERO,
            mfe_ratio: Decimal::ZERO,
            max_atr: dec!(2),
            outcome: Outcome::Active,
            outcome_price: None,
            outcome_time: None,
        };
        assert!(strategy.passes_filter(&signal, dec!(2)));
    }

    #[tokio::test]
    async fn record_outcome_releases_position_lock() {
        let mut strategy = MsrStrategy::new(base_config(), None);
        strategy.active_positions.insert(symbol_key("BTCUSDT", "5m"));

        strategy.record_outcome(Outcome::Tp, "BTCUSDT", "5m").await;

        assert!(!strategy.active_positions.contains(&symbol_key("BTCUSDT", "5m")));
        let tracker = strategy.streak_trackers[&symbol_key("BTCUSDT", "5m")];
        assert_eq!(tracker.total_wins, 1);
    }

    #[test]
    fn release_position_is_idempotent() {
        let mut strategy = MsrStrategy::new(base_config(), None);
        strategy.release_position("BTCUSDT", "5m");
        strategy.release_position("BTCUSDT", "5m");
    }
}
