//! Exact-decimal indicator math for the cold path.
//!
//! The teacher crate reaches for the `ta` crate for this, but `ta` is
//! `f64`-only; the cold path here must not drift under repeated replay of
//! the same history, so every formula is hand-rolled against
//! `rust_decimal::Decimal` directly.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Exponential moving average. Returns `None` if fewer than `period`
/// closes are available. The first EMA value is seeded with the simple
/// average of the first `period` closes, then smoothed forward.
pub fn ema(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let multiplier = dec!(2) / Decimal::from(period + 1);
    let seed_window = &closes[0..period];
    let mut value = sma_of(seed_window);

    for close in &closes[period..] {
        value = (*close - value) * multiplier + value;
    }

    Some(value)
}

/// Simple moving average over the last `period` values.
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(sma_of(&values[values.len() - period..]))
}

fn sma_of(values: &[Decimal]) -> Decimal {
    let sum: Decimal = values.iter().copied().sum();
    sum / Decimal::from(values.len())
}

pub fn highest(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    values[values.len() - period..].iter().copied().reduce(Decimal::max)
}

pub fn lowest(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    values[values.len() - period..].iter().copied().reduce(Decimal::min)
}

fn true_range(high: Decimal, low: Decimal, prev_close: Decimal) -> Decimal {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Wilder's RMA-smoothed Average True Range. Needs `period + 1` candles
/// (one extra for the first true range's previous close).
pub fn atr(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || highs.len() < period + 1 || lows.len() != highs.len() || closes.len() != highs.len() {
        return None;
    }

    let mut trs = Vec::with_capacity(highs.len() - 1);
    for i in 1..highs.len() {
        trs.push(true_range(highs[i], lows[i], closes[i - 1]));
    }

    let mut value = sma_of(&trs[0..period]);
    for tr in &trs[period..] {
        value = (value * Decimal::from(period - 1) + *tr) / Decimal::from(period);
    }

    Some(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibonacciLevels {
    pub level_382: Decimal,
    pub level_500: Decimal,
    pub level_618: Decimal,
}

/// Retracement levels measured down from `high` toward `low`.
pub fn fibonacci_levels(high: Decimal, low: Decimal) -> FibonacciLevels {
    let range = high - low;
    FibonacciLevels {
        level_382: high - range * dec!(0.382),
        level_500: high - range * dec!(0.5),
        level_618: high - range * dec!(0.618),
    }
}

/// Cumulative volume-weighted average price over the whole supplied
/// window (not a daily reset — see DESIGN.md open question). Falls back
/// to the candle's own close when cumulative volume is still zero.
pub fn vwap(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], volumes: &[Decimal]) -> Option<Decimal> {
    if highs.is_empty() || lows.len() != highs.len() || closes.len() != highs.len() || volumes.len() != highs.len() {
        return None;
    }

    let mut cum_pv = Decimal::ZERO;
    let mut cum_vol = Decimal::ZERO;

    for i in 0..highs.len() {
        let typical = (highs[i] + lows[i] + closes[i]) / dec!(3);
        cum_pv += typical * volumes[i];
        cum_vol += volumes[i];
    }

    if cum_vol == Decimal::ZERO {
        Some(*closes.last().unwrap())
    } else {
        Some(cum_pv / cum_vol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema: Decimal,
    pub atr: Decimal,
    pub fib: FibonacciLevels,
    pub vwap: Decimal,
}

/// Computes the full indicator set needed by the strategy in one pass.
/// Returns `None` if the buffer doesn't yet hold `max(ema_period, fib_period,
/// atr_period) (+1 for ATR)` candles.
pub fn calculate_latest(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    volumes: &[Decimal],
    ema_period: usize,
    atr_period: usize,
    fib_period: usize,
) -> Option<IndicatorSnapshot> {
    let ema_value = ema(closes, ema_period)?;
    let atr_value = atr(highs, lows, closes, atr_period)?;
    let fib_high = highest(highs, fib_period)?;
    let fib_low = lowest(lows, fib_period)?;
    let vwap_value = vwap(highs, lows, closes, volumes)?;

    Some(IndicatorSnapshot {
        ema: ema_value,
        atr: atr_value,
        fib: fibonacci_levels(fib_high, fib_low),
        vwap: vwap_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decs(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn ema_needs_full_period() {
        let closes = decs(&[1, 2, 3]);
        assert_eq!(ema(&closes, 5), None);
    }

    #[test]
    fn ema_seeds_with_sma_then_smooths() {
        let closes = decs(&[10, 20, 30, 40, 50]);
        let result = ema(&closes, 3).unwrap();
        // seed = (10+20+30)/3 = 20; mult = 2/4 = 0.5
        // step1: (40-20)*0.5+20 = 30
        // step2: (50-30)*0.5+30 = 40
        assert_eq!(result, dec!(40));
    }

    #[test]
    fn highest_lowest_window() {
        let values = decs(&[5, 9, 2, 7]);
        assert_eq!(highest(&values, 3), Some(dec!(9)));
        assert_eq!(lowest(&values, 3), Some(dec!(2)));
    }

    #[test]
    fn atr_wilder_smoothing() {
        let highs = decs(&[10, 12, 11, 13]);
        let lows = decs(&[8, 9, 9, 10]);
        let closes = decs(&[9, 11, 10, 12]);
        // period=2 needs 3 candles; we have 4
        let result = atr(&highs, &lows, &closes, 2).unwrap();
        assert!(result > Decimal::ZERO);
    }

    #[test]
    fn fibonacci_levels_are_between_high_and_low() {
        let levels = fibonacci_levels(dec!(100), dec!(0));
        assert_eq!(levels.level_382, dec!(61.8));
        assert_eq!(levels.level_500, dec!(50.0));
        assert_eq!(levels.level_618, dec!(38.2));
    }

    #[test]
    fn vwap_falls_back_to_close_on_zero_volume() {
        let highs = decs(&[10]);
        let lows = decs(&[8]);
        let closes = decs(&[9]);
        let volumes = vec![Decimal::ZERO];
        assert_eq!(vwap(&highs, &lows, &closes, &volumes), Some(dec!(9)));
    }

    #[test]
    fn vwap_is_cumulative_volume_weighted() {
        let highs = decs(&[10, 12]);
        let lows = decs(&[8, 10]);
        let closes = decs(&[9, 11]);
        let volumes = decs(&[100, 100]);
        // typical1 = 9, typical2 = 11, equal volume -> average = 10
        assert_eq!(vwap(&highs, &lows, &closes, &volumes), Some(dec!(10)));
    }
}
