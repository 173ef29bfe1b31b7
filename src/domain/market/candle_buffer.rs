use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Default ring capacity: enough history for a 50-period EMA plus
/// comfortable lookback room, without unbounded growth over a long run.
const DEFAULT_MAX_SIZE: usize = 200;

/// Fixed-capacity ring of closed candles for a single `(symbol, timeframe)`,
/// holding exact-`Decimal` OHLCV for indicator computation. A candle
/// sharing the last entry's timestamp replaces it in place rather than
/// appending, so a late-arriving revision of the same period never
/// duplicates a slot.
#[derive(Debug, Clone)]
pub struct ColdCandleBuffer {
    pub symbol: String,
    pub timeframe: String,
    max_size: usize,
    candles: Vec<Candle>,
}

impl ColdCandleBuffer {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self::with_max_size(symbol, timeframe, DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        max_size: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            max_size,
            candles: Vec::new(),
        }
    }

    pub fn add(&mut self, candle: Candle) {
        if let Some(last) = self.candles.last_mut() {
            if last.timestamp == candle.timestamp {
                *last = candle;
                return;
            }
        }

        self.candles.push(candle);
        if self.candles.len() > self.max_size {
            let overflow = self.candles.len() - self.max_size;
            self.candles.drain(0..overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// The second-to-last candle, used for "did the previous candle also
    /// touch this level" checks.
    pub fn previous(&self) -> Option<&Candle> {
        if self.candles.len() < 2 {
            return None;
        }
        self.candles.get(self.candles.len() - 2)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn highs(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.volume).collect()
    }
}
