pub mod kucoin;

pub use kucoin::KucoinClient;

use async_trait::async_trait;

use crate::models::{Candle, PriceSnapshot};
use crate::Result;

/// Market-data operations the pipeline needs from an exchange.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Latest 24h ticker stats for one instrument.
    async fn fetch_ticker(&self, pair: &str) -> Result<PriceSnapshot>;

    /// Most recent candles, oldest first, at most `limit`.
    async fn fetch_ohlcv(&self, pair: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Every listed instrument as a `BASE/QUOTE` identifier.
    async fn load_markets(&self) -> Result<Vec<String>>;
}
