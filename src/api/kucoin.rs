use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::ExchangeGateway;
use crate::config::Credentials;
use crate::error::BotError;
use crate::models::{Candle, PriceSnapshot};
use crate::Result;

const KUCOIN_API_BASE: &str = "https://api.kucoin.com";
const RATE_LIMIT_RPS: u32 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const SUCCESS_CODE: &str = "200000";

// Type alias for the rate limiter to simplify signatures
type KucoinRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// KuCoin public REST client.
///
/// Cloneable; clones share the HTTP connection pool and the rate limiter.
/// Requests are not retried here: the feed-isolation contract leaves retry
/// to callers that want it.
#[derive(Clone)]
pub struct KucoinClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    rate_limiter: Arc<KucoinRateLimiter>,
}

/// Standard KuCoin response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    data: Option<T>,
}

/// Payload of `/api/v1/market/stats`. Numeric fields arrive as strings and
/// may be null on inactive markets.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStats {
    time: i64,
    high: Option<String>,
    low: Option<String>,
    average_price: Option<String>,
    buy: Option<String>,
    sell: Option<String>,
    vol: Option<String>,
    taker_fee_rate: Option<String>,
    maker_fee_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    base_currency: String,
    quote_currency: String,
}

fn parse_field(value: &Option<String>, name: &str) -> Result<f64> {
    let raw = value
        .as_deref()
        .ok_or_else(|| BotError::DataFormat(format!("missing field {}", name)))?;
    raw.parse::<f64>()
        .map_err(|_| BotError::DataFormat(format!("field {} is not numeric: {:?}", name, raw)))
}

/// Candle rows arrive as string arrays:
/// `[time_s, open, close, high, low, volume, turnover]`.
fn candle_from_row(row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(BotError::DataFormat(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let numeric = |index: usize, name: &str| -> Result<f64> {
        row[index].parse::<f64>().map_err(|_| {
            BotError::DataFormat(format!("candle {} is not numeric: {:?}", name, row[index]))
        })
    };
    let seconds = row[0]
        .parse::<i64>()
        .map_err(|_| BotError::DataFormat(format!("candle time is not numeric: {:?}", row[0])))?;

    Ok(Candle {
        timestamp: seconds * 1000,
        open: numeric(1, "open")?,
        close: numeric(2, "close")?,
        high: numeric(3, "high")?,
        low: numeric(4, "low")?,
        volume: numeric(5, "volume")?,
    })
}

impl KucoinClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_base_url(credentials, KUCOIN_API_BASE)
    }

    /// Base-url override for tests against a mock server.
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap());

        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Credentials this client was constructed with. Public endpoints never
    /// transmit them.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// URL symbol form of a pair (`BTC/USDT` -> `BTC-USDT`).
    fn symbol(pair: &str) -> String {
        pair.replace('/', "-")
    }

    /// Rate-limited GET, unwrapping the KuCoin envelope.
    async fn get_data<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::DataSource(format!("{} returned {}", url, status)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| BotError::DataFormat(format!("{}: {}", url, e)))?;
        if envelope.code != SUCCESS_CODE {
            return Err(BotError::DataSource(format!(
                "{} returned code {}",
                url, envelope.code
            )));
        }
        envelope
            .data
            .ok_or_else(|| BotError::DataFormat(format!("{}: missing data", url)))
    }
}

#[async_trait]
impl ExchangeGateway for KucoinClient {
    async fn fetch_ticker(&self, pair: &str) -> Result<PriceSnapshot> {
        let stats: MarketStats = self
            .get_data(&format!(
                "/api/v1/market/stats?symbol={}",
                Self::symbol(pair)
            ))
            .await?;

        Ok(PriceSnapshot {
            timestamp: stats.time,
            high: parse_field(&stats.high, "high")?,
            low: parse_field(&stats.low, "low")?,
            avg_price: parse_field(&stats.average_price, "averagePrice")?,
            bid: parse_field(&stats.buy, "buy")?,
            ask: parse_field(&stats.sell, "sell")?,
            volume: parse_field(&stats.vol, "vol")?,
            taker_fee: parse_field(&stats.taker_fee_rate, "takerFeeRate")?,
            maker_fee: parse_field(&stats.maker_fee_rate, "makerFeeRate")?,
        })
    }

    async fn fetch_ohlcv(&self, pair: &str, limit: u32) -> Result<Vec<Candle>> {
        // Rows come back newest first; keep the most recent `limit` and
        // return them in chronological order.
        let rows: Vec<Vec<String>> = self
            .get_data(&format!(
                "/api/v1/market/candles?type=1min&symbol={}",
                Self::symbol(pair)
            ))
            .await?;

        let mut candles = Vec::with_capacity(rows.len().min(limit as usize));
        for row in rows.iter().take(limit as usize) {
            candles.push(candle_from_row(row)?);
        }
        candles.reverse();
        Ok(candles)
    }

    async fn load_markets(&self) -> Result<Vec<String>> {
        let symbols: Vec<SymbolInfo> = self.get_data("/api/v2/symbols").await?;
        Ok(symbols
            .into_iter()
            .map(|s| format!("{}/{}", s.base_currency, s.quote_currency))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> Credentials {
        Credentials {
            api_key: "abcd1234".to_string(),
            secret: "secret".to_string(),
            passphrase: "phrase".to_string(),
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> KucoinClient {
        KucoinClient::with_base_url(test_credentials(), server.url()).unwrap()
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(KucoinClient::symbol("BTC/USDT"), "BTC-USDT");
        assert_eq!(KucoinClient::symbol("BTC-USDT"), "BTC-USDT");
    }

    #[test]
    fn test_credentials_are_held() {
        let client = KucoinClient::new(test_credentials()).unwrap();
        assert_eq!(client.credentials().api_key, "abcd1234");
    }

    #[tokio::test]
    async fn test_fetch_ticker_maps_fields() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/market/stats?symbol=BTC-USDT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"200000","data":{
                    "time":1700000000000,
                    "symbol":"BTC-USDT",
                    "high":"43500.1","low":"42000.9","averagePrice":"42800.31",
                    "buy":"43000.5","sell":"43001.5","vol":"1234.5",
                    "takerFeeRate":"0.001","makerFeeRate":"0.001"
                }}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let snapshot = client.fetch_ticker("BTC/USDT").await.unwrap();

        assert_eq!(snapshot.timestamp, 1_700_000_000_000);
        assert_eq!(snapshot.bid, 43000.5);
        assert_eq!(snapshot.ask, 43001.5);
        assert_eq!(snapshot.mid(), 43001.0);
        assert_eq!(snapshot.avg_price, 42800.31);
        assert_eq!(snapshot.taker_fee, 0.001);
    }

    #[tokio::test]
    async fn test_fetch_ticker_null_field_is_data_format_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/market/stats?symbol=DEAD-USDT")
            .with_status(200)
            .with_body(
                r#"{"code":"200000","data":{
                    "time":1700000000000,
                    "high":null,"low":null,"averagePrice":null,
                    "buy":null,"sell":null,"vol":null,
                    "takerFeeRate":null,"makerFeeRate":null
                }}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.fetch_ticker("DEAD/USDT").await.unwrap_err();
        assert!(matches!(err, BotError::DataFormat(_)));
    }

    #[tokio::test]
    async fn test_error_code_is_data_source_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/market/stats?symbol=NOPE-USDT")
            .with_status(200)
            .with_body(r#"{"code":"400100","msg":"Unsupported trading pair"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.fetch_ticker("NOPE/USDT").await.unwrap_err();
        assert!(matches!(err, BotError::DataSource(_)));
    }

    #[tokio::test]
    async fn test_http_failure_is_data_source_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/symbols")
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.load_markets().await.unwrap_err();
        assert!(matches!(err, BotError::DataSource(_)));
    }

    #[tokio::test]
    async fn test_fetch_ohlcv_orders_and_limits() {
        let mut server = mockito::Server::new_async().await;
        // Newest first, as the exchange sends them
        let _mock = server
            .mock("GET", "/api/v1/market/candles?type=1min&symbol=BTC-USDT")
            .with_status(200)
            .with_body(
                r#"{"code":"200000","data":[
                    ["1700000120","103","104","105","102","7.5","770"],
                    ["1700000060","101","102","103","100","5.0","505"],
                    ["1700000000","100","101","102","99","4.0","400"]
                ]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let candles = client.fetch_ohlcv("BTC/USDT", 2).await.unwrap();

        // The two most recent, oldest first
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_060_000);
        assert_eq!(candles[0].close, 102.0);
        assert_eq!(candles[1].timestamp, 1_700_000_120_000);
        assert_eq!(candles[1].close, 104.0);
    }

    #[tokio::test]
    async fn test_load_markets_maps_pairs() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/symbols")
            .with_status(200)
            .with_body(
                r#"{"code":"200000","data":[
                    {"symbol":"BTC-USDT","baseCurrency":"BTC","quoteCurrency":"USDT"},
                    {"symbol":"ETH-BTC","baseCurrency":"ETH","quoteCurrency":"BTC"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let markets = client.load_markets().await.unwrap();
        assert_eq!(markets, vec!["BTC/USDT", "ETH/BTC"]);
    }

    #[tokio::test]
    #[ignore] // Hits the real exchange; run with --ignored
    async fn test_fetch_ticker_live() {
        let client = KucoinClient::new(test_credentials()).unwrap();
        let snapshot = client.fetch_ticker("BTC/USDT").await.unwrap();
        assert!(snapshot.bid > 0.0);
        assert!(snapshot.ask >= snapshot.bid);
    }
}
