//! Hot path models.
//!
//! Everything here is plain `f64` and epoch-seconds timestamps so the
//! per-trade update loop (MAE/MFE tracking, outcome checks) never touches
//! `Decimal` arithmetic. These types are never persisted directly; they
//! are converted to their cold path counterparts (`domain::signal::converters`)
//! at the store/cache/callback boundary.

use uuid::Uuid;

pub const DIRECTION_LONG: i8 = 1;
pub const DIRECTION_SHORT: i8 = -1;

/// Generates a fresh globally-unique signal id.
pub fn generate_signal_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastCandle {
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_closed: bool,
}

impl FastCandle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range_size(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastTrade {
    pub agg_trade_id: i64,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: f64,
    pub is_buyer_maker: bool,
}

/// An active position plus the MAE/MFE bookkeeping the trade loop updates
/// on every matching print.
#[derive(Debug, Clone, PartialEq)]
pub struct FastSignal {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub signal_time: f64,
    pub direction: i8,
    pub entry_price: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub atr_at_signal: f64,
    pub streak_at_signal: i64,
    pub mae_ratio: f64,
    pub mfe_ratio: f64,
    pub max_atr: f64,
    pub outcome: String,
    pub outcome_price: Option<f64>,
    pub outcome_time: Option<f64>,
}

impl FastSignal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        symbol: String,
        timeframe: String,
        signal_time: f64,
        direction: i8,
        entry_price: f64,
        tp_price: f64,
        sl_price: f64,
    ) -> Self {
        Self::with_meta(
            id,
            symbol,
            timeframe,
            signal_time,
            direction,
            entry_price,
            tp_price,
            sl_price,
            "msr_retest_capture".to_string(),
            0.0,
            0,
        )
    }

    /// Full constructor including the strategy name and the ATR/streak
    /// values observed at signal time (both frozen once set, per spec).
    #[allow(clippy::too_many_arguments)]
    pub fn with_meta(
        id: String,
        symbol: String,
        timeframe: String,
        signal_time: f64,
        direction: i8,
        entry_price: f64,
        tp_price: f64,
        sl_price: f64,
        strategy: String,
        atr_at_signal: f64,
        streak_at_signal: i64,
    ) -> Self {
        Self {
            id,
            strategy,
            symbol,
            timeframe,
            signal_time,
            direction,
            entry_price,
            tp_price,
            sl_price,
            atr_at_signal,
            streak_at_signal,
            mae_ratio: 0.0,
            mfe_ratio: 0.0,
            max_atr: 0.0,
            outcome: "active".to_string(),
            outcome_price: None,
            outcome_time: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.outcome == "active"
    }

    pub fn risk_amount(&self) -> f64 {
        (self.entry_price - self.sl_price).abs()
    }

    pub fn reward_amount(&self) -> f64 {
        (self.tp_price - self.entry_price).abs()
    }

    /// Updates MAE (max adverse excursion) and MFE (max favorable excursion)
    /// ratios against risk_amount. Both are monotonic non-decreasing: a
    /// price tick can only push the relevant ratio up, never down.
    pub fn update_mae(&mut self, price: f64) {
        let risk = self.risk_amount();
        if risk <= 0.0 {
            return;
        }

        let excursion = match self.direction {
            DIRECTION_LONG => self.entry_price - price,
            _ => price - self.entry_price,
        };

        if excursion > 0.0 {
            let ratio = excursion / risk;
            if ratio > self.mae_ratio {
                self.mae_ratio = ratio;
            }
        } else {
            let ratio = -excursion / risk;
            if ratio > self.mfe_ratio {
                self.mfe_ratio = ratio;
            }
        }
    }

    pub fn update_max_atr(&mut self, atr: f64) {
        if atr > self.max_atr {
            self.max_atr = atr;
        }
    }

    /// Checks whether `price` has resolved this signal (TP or SL touched).
    /// Exact-equality-or-beyond comparisons, matching the original's
    /// `>=`/`<=` touch semantics. Returns `true` iff the outcome changed.
    pub fn check_outcome(&mut self, price: f64, timestamp: f64) -> bool {
        if !self.is_active() {
            return false;
        }

        let hit = match self.direction {
            DIRECTION_LONG => {
                if price >= self.tp_price {
                    Some("tp")
                } else if price <= self.sl_price {
                    Some("sl")
                } else {
                    None
                }
            }
            _ => {
                if price <= self.tp_price {
                    Some("tp")
                } else if price >= self.sl_price {
                    Some("sl")
                } else {
                    None
                }
            }
        };

        match hit {
            Some(outcome) => {
                self.outcome = outcome.to_string();
                self.outcome_price = Some(price);
                self.outcome_time = Some(timestamp);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_signal() -> FastSignal {
        FastSignal::new(
            "test-123".into(),
            "BTCUSDT".into(),
            "5m".into(),
            1704067200.0,
            DIRECTION_LONG,
            42000.0,
            42400.0,
            41800.0,
        )
    }

    fn short_signal() -> FastSignal {
        FastSignal::new(
            "test-123".into(),
            "BTCUSDT".into(),
            "5m".into(),
            1704067200.0,
            DIRECTION_SHORT,
            42000.0,
            41600.0,
            42200.0,
        )
    }

    #[test]
    fn risk_reward_long() {
        let s = long_signal();
        assert_eq!(s.risk_amount(), 200.0);
        assert_eq!(s.reward_amount(), 400.0);
    }

    #[test]
    fn risk_reward_short() {
        let s = short_signal();
        assert_eq!(s.risk_amount(), 200.0);
        assert_eq!(s.reward_amount(), 400.0);
    }

    #[test]
    fn mae_update_long() {
        let mut s = long_signal();
        s.update_mae(41900.0);
        assert_eq!(s.mae_ratio, 0.5);
        assert_eq!(s.mfe_ratio, 0.0);

        s.update_mae(42200.0);
        assert_eq!(s.mae_ratio, 0.5);
        assert_eq!(s.mfe_ratio, 1.0);
    }

    #[test]
    fn mae_update_short() {
        let mut s = short_signal();
        s.update_mae(42100.0);
        assert_eq!(s.mae_ratio, 0.5);
        assert_eq!(s.mfe_ratio, 0.0);

        s.update_mae(41800.0);
        assert_eq!(s.mae_ratio, 0.5);
        assert_eq!(s.mfe_ratio, 1.0);
    }

    #[test]
    fn check_outcome_tp_long() {
        let mut s = long_signal();
        assert!(s.check_outcome(42400.0, 1704070800.0));
        assert_eq!(s.outcome, "tp");
        assert_eq!(s.outcome_price, Some(42400.0));
        assert!(!s.is_active());
    }

    #[test]
    fn check_outcome_sl_long() {
        let mut s = long_signal();
        assert!(s.check_outcome(41800.0, 1704070800.0));
        assert_eq!(s.outcome, "sl");
    }

    #[test]
    fn check_outcome_tp_short() {
        let mut s = short_signal();
        assert!(s.check_outcome(41600.0, 1704070800.0));
        assert_eq!(s.outcome, "tp");
    }

    #[test]
    fn check_outcome_sl_short() {
        let mut s = short_signal();
        assert!(s.check_outcome(42200.0, 1704070800.0));
        assert_eq!(s.outcome, "sl");
    }

    #[test]
    fn check_outcome_is_at_most_once() {
        let mut s = long_signal();
        assert!(s.check_outcome(42400.0, 1704070800.0));
        assert!(!s.check_outcome(42500.0, 1704070900.0));
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| generate_signal_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
