//! Strategy configuration: environment-variable loading and TOML parsing
//! for the MSR Retest Capture engine.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

/// Per-`(symbol, timeframe)` signal quality filter. Absent from the
/// filter table entirely, or present with `enabled = false`, rejects
/// every signal for that key (see `MsrStrategy::passes_filter`).
#[derive(Debug, Clone, Deserialize)]
pub struct SignalFilterConfig {
    pub symbol: String,
    pub timeframe: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub streak_lo: i64,
    pub streak_hi: i64,
    #[serde(default)]
    pub atr_pct_threshold: f64,
    #[serde(default)]
    pub position_qty: Decimal,
}

fn default_true() -> bool {
    true
}

impl SignalFilterConfig {
    pub fn key(&self) -> String {
        format!("{}_{}", self.symbol, self.timeframe)
    }
}

/// Configuration for the MSR Retest Capture strategy.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub ema_period: usize,
    pub fib_period: usize,
    pub atr_period: usize,
    pub tp_atr_mult: Decimal,
    pub sl_atr_mult: Decimal,
    /// Currently unused by the default retest rule (spec open question);
    /// carried through for a future touch-tolerance rule variant.
    pub touch_tolerance: Decimal,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub target_timeframes: Vec<String>,
    pub filters: HashMap<String, SignalFilterConfig>,
}

impl StrategyConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ema_period: Self::parse_usize("EMA_PERIOD", 50)?,
            atr_period: Self::parse_usize("ATR_PERIOD", 9)?,
            fib_period: Self::parse_usize("FIB_PERIOD", 9)?,
            tp_atr_mult: Self::parse_decimal("TP_ATR_MULT", "2.0")?,
            sl_atr_mult: Self::parse_decimal("SL_ATR_MULT", "8.84")?,
            touch_tolerance: Self::parse_decimal("TOUCH_TOLERANCE", "0.001")?,
            symbols: Self::parse_list("SYMBOLS", &["BTCUSDT"]),
            timeframes: Self::parse_list("TIMEFRAMES", &["5m"]),
            target_timeframes: Self::parse_list("TARGET_TIMEFRAMES", &["3m", "5m", "15m", "30m"]),
            filters: HashMap::new(),
        })
    }

    /// Parses a full TOML document, including `[[filters]]` tables, e.g.:
    ///
    /// ```toml
    /// ema_period = 50
    /// atr_period = 9
    /// fib_period = 9
    /// tp_atr_mult = "2.0"
    /// sl_atr_mult = "8.84"
    /// touch_tolerance = "0.001"
    /// symbols = ["BTCUSDT"]
    /// timeframes = ["5m"]
    /// target_timeframes = ["3m", "5m", "15m", "30m"]
    ///
    /// [[filters]]
    /// symbol = "BTCUSDT"
    /// timeframe = "5m"
    /// enabled = true
    /// streak_lo = -3
    /// streak_hi = 3
    /// atr_pct_threshold = 0.5
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawStrategyConfig =
            toml::from_str(contents).context("failed to parse strategy config TOML")?;

        let mut filters = HashMap::new();
        for filter in raw.filters {
            filters.insert(filter.key(), filter);
        }

        Ok(Self {
            ema_period: raw.ema_period,
            atr_period: raw.atr_period,
            fib_period: raw.fib_period,
            tp_atr_mult: raw.tp_atr_mult,
            sl_atr_mult: raw.sl_atr_mult,
            touch_tolerance: raw.touch_tolerance,
            symbols: raw.symbols,
            timeframes: raw.timeframes,
            target_timeframes: raw.target_timeframes,
            filters,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("failed to parse {key}"))
    }

    fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
        let raw = env::var(key).unwrap_or_else(|_| default.to_string());
        raw.parse::<Decimal>()
            .or_else(|_| raw.parse::<f64>().ok().and_then(Decimal::from_f64).ok_or(()))
            .map_err(|_| anyhow::anyhow!("failed to parse {key} as a decimal: {raw}"))
    }

    fn parse_list(key: &str, default: &[&str]) -> Vec<String> {
        match env::var(key) {
            Ok(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
            Err(_) => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStrategyConfig {
    ema_period: usize,
    atr_period: usize,
    fib_period: usize,
    tp_atr_mult: Decimal,
    sl_atr_mult: Decimal,
    touch_tolerance: Decimal,
    symbols: Vec<String>,
    timeframes: Vec<String>,
    target_timeframes: Vec<String>,
    #[serde(default)]
    filters: Vec<SignalFilterConfig>,
}
