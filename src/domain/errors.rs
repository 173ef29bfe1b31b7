use thiserror::Error;

/// Errors raised by the MSR Retest Capture strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("failed to persist signal {symbol}/{timeframe}: {reason}")]
    SaveFailed {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    #[error("failed to persist streak for {symbol}/{timeframe}: {reason}")]
    StreakSaveFailed {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    #[error("no ATR percentile tracker registered for {symbol}/{timeframe}")]
    MissingAtrTracker { symbol: String, timeframe: String },
}

/// Errors raised by the position tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to update outcome for signal {signal_id}: {reason}")]
    UpdateFailed { signal_id: String, reason: String },

    #[error("signal {signal_id} is not tracked as active")]
    NotActive { signal_id: String },
}

/// Errors raised by the replay/checkpoint service.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("no checkpoint found for {symbol}/{timeframe} and no full-history replay requested")]
    NoCheckpoint { symbol: String, timeframe: String },

    #[error("checkpoint for {symbol}/{timeframe} is pending; prior run crashed mid-replay")]
    PendingCheckpoint { symbol: String, timeframe: String },

    #[error("failed to persist checkpoint for {symbol}/{timeframe}: {reason}")]
    CheckpointSaveFailed {
        symbol: String,
        timeframe: String,
        reason: String,
    },
}

/// Errors raised by the candle aggregator.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("candle for {symbol} arrived out of order: {timestamp} <= last seen {last_seen}")]
    OutOfOrder {
        symbol: String,
        timestamp: i64,
        last_seen: i64,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("missing required configuration: {field}")]
    Missing { field: String },
}
