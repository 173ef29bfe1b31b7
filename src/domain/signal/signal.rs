use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Active,
    Tp,
    Sl,
}

/// A resolved or in-flight MSR signal (cold path). Every arithmetic field
/// is `Decimal`; this is the record that crosses the store/cache/callback
/// boundary, never `FastSignal` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub signal_time: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub atr_at_signal: Decimal,
    /// Signed streak value observed at signal creation time; frozen once set.
    pub streak_at_signal: i64,
    pub mae_ratio: Decimal,
    pub mfe_ratio: Decimal,
    pub max_atr: Decimal,
    pub outcome: Outcome,
    pub outcome_price: Option<Decimal>,
    pub outcome_time: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn risk_amount(&self) -> Decimal {
        (self.entry_price - self.sl_price).abs()
    }

    pub fn reward_amount(&self) -> Decimal {
        (self.tp_price - self.entry_price).abs()
    }

    pub fn streak_at_signal(&self) -> i64 {
        self.streak_at_signal
    }
}

/// Per-`(symbol, timeframe)` win/loss streak bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakTracker {
    /// Positive while on a winning streak, negative while on a losing one.
    pub current_streak: i64,
    pub total_wins: u64,
    pub total_losses: u64,
}

impl StreakTracker {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Tp => {
                self.total_wins += 1;
                self.current_streak = if self.current_streak > 0 {
                    self.current_streak + 1
                } else {
                    1
                };
            }
            Outcome::Sl => {
                self.total_losses += 1;
                self.current_streak = if self.current_streak < 0 {
                    self.current_streak - 1
                } else {
                    -1
                };
            }
            Outcome::Active => {}
        }
    }
}
