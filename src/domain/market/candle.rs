use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_is_closed() -> bool {
    true
}

/// A closed 1-minute candle (cold path). Exact decimal OHLC for storage
/// and for any computation that must not drift under repeated replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Candle open timestamp, in milliseconds since epoch.
    pub timestamp: i64,
    /// False while the source is still updating this period in place;
    /// true once it finalizes and will never change again. Historical
    /// candle files predate this field, so it defaults to closed.
    #[serde(default = "default_is_closed")]
    pub is_closed: bool,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range_size(&self) -> Decimal {
        self.high - self.low
    }
}

/// An aggregated trade print (cold path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTrade {
    pub symbol: String,
    pub agg_trade_id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: i64,
    pub is_buyer_maker: bool,
}
