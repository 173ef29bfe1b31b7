//! One-way boundary converters between the hot path (`f64`, epoch-seconds)
//! and cold path (`Decimal`, `DateTime<Utc>`) models.
//!
//! Conversion only ever happens at a boundary: `fast_*` types are built and
//! mutated on the trade-processing hot path, then converted to their cold
//! counterpart exactly once, at the point they are persisted or handed to
//! an external callback. Nothing converts cold-to-fast except warmup/replay
//! seeding, which needs to reconstruct hot state from stored history.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::domain::market::candle::{AggTrade, Candle};
use crate::domain::signal::fast::{DIRECTION_LONG, FastCandle, FastSignal, FastTrade};
use crate::domain::signal::signal::{Direction, Outcome, Signal};

fn epoch_seconds_to_datetime(ts: f64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt((ts * 1000.0).round() as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn datetime_to_epoch_seconds(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

fn decimal_to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

fn f64_to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

pub fn candle_to_fast(candle: &Candle) -> FastCandle {
    FastCandle {
        timestamp: candle.timestamp as f64 / 1000.0,
        open: decimal_to_f64(candle.open),
        high: decimal_to_f64(candle.high),
        low: decimal_to_f64(candle.low),
        close: decimal_to_f64(candle.close),
        volume: decimal_to_f64(candle.volume),
        is_closed: candle.is_closed,
    }
}

pub fn fast_to_candle(symbol: &str, candle: &FastCandle) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        open: f64_to_decimal(candle.open),
        high: f64_to_decimal(candle.high),
        low: f64_to_decimal(candle.low),
        close: f64_to_decimal(candle.close),
        volume: f64_to_decimal(candle.volume),
        timestamp: (candle.timestamp * 1000.0).round() as i64,
        is_closed: candle.is_closed,
    }
}

pub fn aggtrade_to_fast(trade: &AggTrade) -> FastTrade {
    FastTrade {
        agg_trade_id: trade.agg_trade_id,
        price: decimal_to_f64(trade.price),
        quantity: decimal_to_f64(trade.quantity),
        timestamp: trade.timestamp as f64 / 1000.0,
        is_buyer_maker: trade.is_buyer_maker,
    }
}

pub fn signal_to_fast(signal: &Signal) -> FastSignal {
    let direction = match signal.direction {
        Direction::Long => DIRECTION_LONG,
        Direction::Short => crate::domain::signal::fast::DIRECTION_SHORT,
    };

    FastSignal {
        id: signal.id.clone(),
        strategy: signal.strategy.clone(),
        symbol: signal.symbol.clone(),
        timeframe: signal.timeframe.clone(),
        signal_time: datetime_to_epoch_seconds(signal.signal_time),
        direction,
        entry_price: decimal_to_f64(signal.entry_price),
        tp_price: decimal_to_f64(signal.tp_price),
        sl_price: decimal_to_f64(signal.sl_price),
        atr_at_signal: decimal_to_f64(signal.atr_at_signal),
        streak_at_signal: signal.streak_at_signal,
        mae_ratio: decimal_to_f64(signal.mae_ratio),
        mfe_ratio: decimal_to_f64(signal.mfe_ratio),
        max_atr: decimal_to_f64(signal.max_atr),
        outcome: match signal.outcome {
            Outcome::Active => "active".to_string(),
            Outcome::Tp => "tp".to_string(),
            Outcome::Sl => "sl".to_string(),
        },
        outcome_price: signal.outcome_price.map(decimal_to_f64),
        outcome_time: signal.outcome_time.map(datetime_to_epoch_seconds),
    }
}

pub fn fast_to_signal(fast: &FastSignal) -> Signal {
    let direction = if fast.direction == DIRECTION_LONG {
        Direction::Long
    } else {
        Direction::Short
    };

    let outcome = match fast.outcome.as_str() {
        "tp" => Outcome::Tp,
        "sl" => Outcome::Sl,
        _ => Outcome::Active,
    };

    Signal {
        id: fast.id.clone(),
        strategy: fast.strategy.clone(),
        symbol: fast.symbol.clone(),
        timeframe: fast.timeframe.clone(),
        signal_time: epoch_seconds_to_datetime(fast.signal_time),
        direction,
        entry_price: f64_to_decimal(fast.entry_price),
        tp_price: f64_to_decimal(fast.tp_price),
        sl_price: f64_to_decimal(fast.sl_price),
        atr_at_signal: f64_to_decimal(fast.atr_at_signal),
        streak_at_signal: fast.streak_at_signal,
        mae_ratio: f64_to_decimal(fast.mae_ratio),
        mfe_ratio: f64_to_decimal(fast.mfe_ratio),
        max_atr: f64_to_decimal(fast.max_atr),
        outcome,
        outcome_price: fast.outcome_price.map(f64_to_decimal),
        outcome_time: fast.outcome_time.map(epoch_seconds_to_datetime),
    }
}
