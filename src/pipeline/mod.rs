// Pipeline wiring: one price feed and one indicator engine per instrument,
// a single executor on the shared signal stream, and an optional latency
// monitor behind the persistence toggle.

pub mod executor;
pub mod indicator;
pub mod latency;
pub mod price_feed;

pub use executor::{Executor, STALENESS_THRESHOLD_MS};
pub use indicator::IndicatorEngine;
pub use latency::LatencyMonitor;
pub use price_feed::PriceFeed;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::ExchangeGateway;
use crate::config::BotConfig;
use crate::models::Candle;
use crate::persistence::{LatencyStore, OhlcCache};
use crate::status::StatusBoard;
use crate::Result;

/// Indicator windows for the fast and slow averages.
pub const FAST_WINDOW: usize = 10;
pub const SLOW_WINDOW: usize = 45;

/// Markets are eligible when their quote currency contains this.
const QUOTE_CURRENCY: &str = "usdt";

/// Owns the shutdown channel and wires the per-pair workers together.
///
/// Workers are deliberately independent: a feed that dies takes down only
/// its own pair, and the executor keeps draining whichever engines remain.
pub struct Supervisor {
    config: BotConfig,
    gateway: Arc<dyn ExchangeGateway>,
    status: StatusBoard,
    store: LatencyStore,
    cache: OhlcCache,
    shutdown: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        config: BotConfig,
        gateway: Arc<dyn ExchangeGateway>,
        status: StatusBoard,
        store: LatencyStore,
        cache: OhlcCache,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            gateway,
            status,
            store,
            cache,
            shutdown,
        }
    }

    /// Pick the instruments to trade: listed markets quoted in USDT, in
    /// exchange order, capped at the configured count.
    pub async fn select_pairs(&self) -> Result<Vec<String>> {
        let markets = self.gateway.load_markets().await?;
        let pairs: Vec<String> = markets
            .into_iter()
            .filter(|market| {
                market
                    .split('/')
                    .nth(1)
                    .map(|quote| quote.to_lowercase().contains(QUOTE_CURRENCY))
                    .unwrap_or(false)
            })
            .take(self.config.number_of_pairs)
            .collect();
        Ok(pairs)
    }

    /// Spawn the full pipeline for `pairs` and return every task handle.
    /// Engines are seeded with historical candles before their feeds start.
    pub async fn spawn(&self, pairs: &[String]) -> Vec<JoinHandle<()>> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (latency_tx, latency_rx) = if self.config.latency_logging {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut handles = Vec::new();
        for pair in pairs {
            let (tick_tx, tick_rx) = mpsc::unbounded_channel();

            let mut engine = IndicatorEngine::new(
                pair.clone(),
                FAST_WINDOW,
                SLOW_WINDOW,
                tick_rx,
                signal_tx.clone(),
                latency_tx.clone(),
                self.status.clone(),
                self.subscribe(),
            );
            let candles = self.seed_candles(pair).await;
            engine.seed(&candles);

            let feed = PriceFeed::new(
                pair.clone(),
                self.gateway.clone(),
                Duration::from_secs_f64(self.config.ticker_interval),
                tick_tx,
                self.subscribe(),
            );

            handles.push(tokio::spawn(feed.run()));
            handles.push(tokio::spawn(engine.run()));
        }

        // Only engine clones remain; the executor sees the channel close
        // once every engine has stopped.
        drop(signal_tx);
        drop(latency_tx);

        let executor = Executor::new(signal_rx, self.status.clone(), self.subscribe());
        handles.push(tokio::spawn(executor.run()));

        if let Some(rx) = latency_rx {
            let monitor = LatencyMonitor::new(
                rx,
                self.store.clone(),
                self.config.saving_batch_size,
                self.subscribe(),
            );
            handles.push(tokio::spawn(monitor.run()));
        }

        handles
    }

    /// Historical closes for warm-up. Prefers a fresh fetch (which also
    /// refreshes the local cache); falls back to the cache when the
    /// exchange is unreachable, and to an empty history after that.
    async fn seed_candles(&self, pair: &str) -> Vec<Candle> {
        match self.gateway.fetch_ohlcv(pair, self.config.ohlc_limit).await {
            Ok(candles) => {
                if let Err(e) = self.cache.store(pair, &candles) {
                    tracing::warn!("[{}] could not cache candles: {}", pair, e);
                }
                candles
            }
            Err(e) => {
                tracing::warn!("[{}] candle fetch failed ({}), trying cache", pair, e);
                match self.cache.load(pair) {
                    Ok(Some(candles)) => {
                        tracing::info!("[{}] using {} cached candles", pair, candles.len());
                        candles
                    }
                    Ok(None) => {
                        tracing::warn!("[{}] no cached candles, starting unseeded", pair);
                        Vec::new()
                    }
                    Err(e) => {
                        tracing::warn!("[{}] cache unreadable ({}), starting unseeded", pair, e);
                        Vec::new()
                    }
                }
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::models::PriceSnapshot;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubGateway {
        markets: Vec<String>,
        candles: Result<Vec<Candle>>,
    }

    impl StubGateway {
        fn with_markets(markets: &[&str]) -> Self {
            Self {
                markets: markets.iter().map(|m| m.to_string()).collect(),
                candles: Ok(Vec::new()),
            }
        }

        fn with_candles(candles: Result<Vec<Candle>>) -> Self {
            Self {
                markets: Vec::new(),
                candles,
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for StubGateway {
        async fn fetch_ticker(&self, _pair: &str) -> Result<PriceSnapshot> {
            Err(BotError::DataSource("stub".to_string()))
        }

        async fn fetch_ohlcv(&self, _pair: &str, _limit: u32) -> Result<Vec<Candle>> {
            match &self.candles {
                Ok(candles) => Ok(candles.clone()),
                Err(_) => Err(BotError::DataSource("stub fetch failure".to_string())),
            }
        }

        async fn load_markets(&self) -> Result<Vec<String>> {
            Ok(self.markets.clone())
        }
    }

    fn candle(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn supervisor(gateway: StubGateway, config: BotConfig, dir: &TempDir) -> Supervisor {
        Supervisor::new(
            config,
            Arc::new(gateway),
            StatusBoard::new(0),
            LatencyStore::new(dir.path(), 0),
            OhlcCache::new(dir.path()),
        )
    }

    #[tokio::test]
    async fn test_select_pairs_keeps_usdt_quotes() {
        let dir = TempDir::new().unwrap();
        let gateway =
            StubGateway::with_markets(&["BTC/USDT", "ETH/BTC", "SOL/USDT", "EUR/GBP", "bad"]);
        let config = BotConfig {
            number_of_pairs: 10,
            ..BotConfig::default()
        };
        let sup = supervisor(gateway, config, &dir);

        let pairs = sup.select_pairs().await.unwrap();
        assert_eq!(pairs, vec!["BTC/USDT", "SOL/USDT"]);
    }

    #[tokio::test]
    async fn test_select_pairs_caps_at_configured_count() {
        let dir = TempDir::new().unwrap();
        let gateway = StubGateway::with_markets(&["A/USDT", "B/USDT", "C/USDT"]);
        let config = BotConfig {
            number_of_pairs: 2,
            ..BotConfig::default()
        };
        let sup = supervisor(gateway, config, &dir);

        let pairs = sup.select_pairs().await.unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_candles_refreshes_cache() {
        let dir = TempDir::new().unwrap();
        let fetched = vec![candle(60_000, 10.0), candle(120_000, 11.0)];
        let gateway = StubGateway::with_candles(Ok(fetched.clone()));
        let sup = supervisor(gateway, BotConfig::default(), &dir);

        let candles = sup.seed_candles("BTC/USDT").await;
        assert_eq!(candles, fetched);

        let cached = OhlcCache::new(dir.path()).load("BTC/USDT").unwrap();
        assert_eq!(cached, Some(fetched));
    }

    #[tokio::test]
    async fn test_seed_candles_falls_back_to_cache() {
        let dir = TempDir::new().unwrap();
        let cached = vec![candle(60_000, 10.0)];
        OhlcCache::new(dir.path()).store("BTC/USDT", &cached).unwrap();

        let gateway = StubGateway::with_candles(Err(BotError::DataSource("down".to_string())));
        let sup = supervisor(gateway, BotConfig::default(), &dir);

        let candles = sup.seed_candles("BTC/USDT").await;
        assert_eq!(candles, cached);
    }

    #[tokio::test]
    async fn test_seed_candles_empty_without_fetch_or_cache() {
        let dir = TempDir::new().unwrap();
        let gateway = StubGateway::with_candles(Err(BotError::DataSource("down".to_string())));
        let sup = supervisor(gateway, BotConfig::default(), &dir);

        assert!(sup.seed_candles("BTC/USDT").await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_counts_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let gateway = StubGateway::with_markets(&[]);
        let config = BotConfig {
            latency_logging: true,
            ..BotConfig::default()
        };
        let sup = supervisor(gateway, config, &dir);

        let pairs = vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()];
        let handles = sup.spawn(&pairs).await;
        // Two tasks per pair, one executor, one latency monitor
        assert_eq!(handles.len(), pairs.len() * 2 + 2);

        sup.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_spawn_without_latency_monitor() {
        let dir = TempDir::new().unwrap();
        let gateway = StubGateway::with_markets(&[]);
        let config = BotConfig {
            latency_logging: false,
            ..BotConfig::default()
        };
        let sup = supervisor(gateway, config, &dir);

        let handles = sup.spawn(&["BTC/USDT".to_string()]).await;
        assert_eq!(handles.len(), 3);

        sup.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
