use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized 24h ticker sample for one instrument at poll time.
///
/// Timestamps are exchange epoch milliseconds. Ownership moves from the
/// price feed to its indicator engine over the snapshot channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp: i64,
    pub high: f64,
    pub low: f64,
    pub avg_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub taker_fee: f64,
    pub maker_fee: f64,
}

impl PriceSnapshot {
    /// Mid-price between best bid and best ask.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// OHLCV candlestick, timestamp in epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trade direction carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Crossover signal emitted by an indicator engine, consumed exactly once
/// by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: i64,
    pub direction: Direction,
    pub pair: String,
    pub price: f64,
}

/// Executed (simulated) trade. `profit` and `roi` are set on sells only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub timestamp: i64,
    pub pair: String,
    pub direction: Direction,
    pub price: f64,
    pub profit: Option<f64>,
    pub roi: Option<f64>,
}

impl TradeRecord {
    pub fn buy(timestamp: i64, pair: &str, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            pair: pair.to_string(),
            direction: Direction::Buy,
            price,
            profit: None,
            roi: None,
        }
    }

    pub fn sell(timestamp: i64, pair: &str, price: f64, profit: f64, roi: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            pair: pair.to_string(),
            direction: Direction::Sell,
            price,
            profit: Some(profit),
            roi: Some(roi),
        }
    }
}

/// Delay between an exchange timestamp and the moment the engine processed
/// the sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatencySample {
    pub timestamp: i64,
    pub latency_ms: i64,
}
