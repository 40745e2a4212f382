use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::api::ExchangeGateway;
use crate::error::BotError;
use crate::models::PriceSnapshot;

/// Polls the exchange ticker for one instrument and forwards snapshots
/// downstream. A malformed sample costs only that tick; a transport failure
/// stops this feed and this feed alone. The loop also exits on shutdown or
/// when the consumer goes away.
pub struct PriceFeed {
    pair: String,
    gateway: Arc<dyn ExchangeGateway>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<PriceSnapshot>,
    shutdown: watch::Receiver<bool>,
}

impl PriceFeed {
    pub fn new(
        pair: impl Into<String>,
        gateway: Arc<dyn ExchangeGateway>,
        poll_interval: Duration,
        tx: mpsc::UnboundedSender<PriceSnapshot>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pair: pair.into(),
            gateway,
            poll_interval,
            tx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🔄 [{}] price feed starting", self.pair);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !self.poll_once().await {
                        break;
                    }
                }
            }
        }

        tracing::debug!("[{}] price feed stopped", self.pair);
    }

    /// One poll. Returns false once this feed should stop.
    async fn poll_once(&self) -> bool {
        match self.gateway.fetch_ticker(&self.pair).await {
            Ok(snapshot) => self.tx.send(snapshot).is_ok(),
            Err(BotError::DataFormat(e)) => {
                tracing::warn!("[{}] dropping malformed ticker: {}", self.pair, e);
                true
            }
            Err(e) => {
                tracing::error!("[{}] ticker fetch failed, stopping feed: {}", self.pair, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::models::Candle;
    use crate::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Yields snapshots with timestamps 1, 2, 3... and fails on the
    /// configured call numbers.
    struct CountingGateway {
        calls: AtomicI64,
        malformed_on: HashSet<i64>,
        unreachable_on: HashSet<i64>,
    }

    impl CountingGateway {
        fn new() -> Self {
            Self {
                calls: AtomicI64::new(0),
                malformed_on: HashSet::new(),
                unreachable_on: HashSet::new(),
            }
        }

        fn malformed_on(calls: impl IntoIterator<Item = i64>) -> Self {
            Self {
                malformed_on: calls.into_iter().collect(),
                ..Self::new()
            }
        }

        fn unreachable_on(calls: impl IntoIterator<Item = i64>) -> Self {
            Self {
                unreachable_on: calls.into_iter().collect(),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for CountingGateway {
        async fn fetch_ticker(&self, _pair: &str) -> Result<PriceSnapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.malformed_on.contains(&call) {
                return Err(BotError::DataFormat("scripted bad field".to_string()));
            }
            if self.unreachable_on.contains(&call) {
                return Err(BotError::DataSource("scripted outage".to_string()));
            }
            Ok(PriceSnapshot {
                timestamp: call,
                high: 101.0,
                low: 99.0,
                avg_price: 100.0,
                bid: 99.5,
                ask: 100.5,
                volume: 10.0,
                taker_fee: 0.001,
                maker_fee: 0.001,
            })
        }

        async fn fetch_ohlcv(&self, _pair: &str, _limit: u32) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn load_markets(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn spawn_feed(
        gateway: Arc<dyn ExchangeGateway>,
    ) -> (
        mpsc::UnboundedReceiver<PriceSnapshot>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let feed = PriceFeed::new(
            "BTC/USDT",
            gateway,
            Duration::from_secs(5),
            tx,
            shutdown_rx,
        );
        let handle = tokio::spawn(feed.run());
        (rx, shutdown_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_and_forwards_snapshots() {
        let (mut rx, shutdown_tx, handle) = spawn_feed(Arc::new(CountingGateway::new()));

        for expected in 1..=3 {
            let snapshot = rx.recv().await.unwrap();
            assert_eq!(snapshot.timestamp, expected);
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_tick_is_skipped() {
        let gateway = Arc::new(CountingGateway::malformed_on([2]));
        let (mut rx, shutdown_tx, handle) = spawn_feed(gateway);

        assert_eq!(rx.recv().await.unwrap().timestamp, 1);
        // Call 2 was malformed, so the next delivery is call 3
        assert_eq!(rx.recv().await.unwrap().timestamp, 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_stops_feed() {
        let gateway = Arc::new(CountingGateway::unreachable_on([2]));
        let (mut rx, _shutdown_tx, handle) = spawn_feed(gateway);

        assert_eq!(rx.recv().await.unwrap().timestamp, 1);

        // The feed aborts on the outage without being told to shut down
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_consumer_dropped() {
        let (rx, _shutdown_tx, handle) = spawn_feed(Arc::new(CountingGateway::new()));
        drop(rx);

        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
