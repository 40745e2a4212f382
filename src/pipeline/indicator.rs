use tokio::sync::{mpsc, watch};

use crate::indicators::Ewma;
use crate::models::{Candle, Direction, LatencySample, PriceSnapshot, Signal};
use crate::status::StatusBoard;

/// Sign of the fast/slow spread, collapsed to -1, 0 or +1.
fn sign_of(diff: f64) -> i8 {
    if diff > 0.0 {
        1
    } else if diff < 0.0 {
        -1
    } else {
        0
    }
}

/// Edge-triggered crossover between the last two spread signs. Landing
/// exactly on zero arms the detector without firing it.
fn crossover(prev: Option<i8>, sign: i8) -> Option<Direction> {
    match prev {
        Some(prev) if prev <= 0 && sign > 0 => Some(Direction::Buy),
        Some(prev) if prev >= 0 && sign < 0 => Some(Direction::Sell),
        _ => None,
    }
}

/// Per-instrument indicator worker. Consumes ticker snapshots, maintains a
/// fast and a slow EWMA over the mid price, and emits a signal whenever the
/// spread between them changes sign.
pub struct IndicatorEngine {
    pair: String,
    ema_fast: Ewma,
    ema_slow: Ewma,
    prev_sign: Option<i8>,
    last_timestamp: Option<i64>,
    rx: mpsc::UnboundedReceiver<PriceSnapshot>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    latency_tx: Option<mpsc::UnboundedSender<LatencySample>>,
    status: StatusBoard,
    shutdown: watch::Receiver<bool>,
}

impl IndicatorEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: impl Into<String>,
        fast_window: usize,
        slow_window: usize,
        rx: mpsc::UnboundedReceiver<PriceSnapshot>,
        signal_tx: mpsc::UnboundedSender<Signal>,
        latency_tx: Option<mpsc::UnboundedSender<LatencySample>>,
        status: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pair: pair.into(),
            ema_fast: Ewma::new(fast_window),
            ema_slow: Ewma::new(slow_window),
            prev_sign: None,
            last_timestamp: None,
            rx,
            signal_tx,
            latency_tx,
            status,
            shutdown,
        }
    }

    /// Warm both averages with historical closes before live data arrives.
    /// Seeding never emits signals; it only positions the detector so the
    /// first live tick can.
    pub fn seed(&mut self, candles: &[Candle]) {
        let mut used = 0usize;
        for candle in candles {
            if !candle.close.is_finite() {
                tracing::warn!("[{}] dropping non-finite close in seed history", self.pair);
                continue;
            }
            let (fast, slow, diff) = self.advance(candle.close);
            self.status
                .record_series_point(&self.pair, candle.timestamp, candle.close, fast, slow, diff);
            used += 1;
        }
        if used > 0 {
            tracing::info!("[{}] seeded indicators with {} candles", self.pair, used);
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                received = self.rx.recv() => {
                    match received {
                        Some(snapshot) => self.process(snapshot),
                        None => break,
                    }
                }
            }
        }

        tracing::debug!("[{}] indicator engine stopped", self.pair);
    }

    /// Feed one snapshot through the averages and emit a signal on a sign
    /// flip of the spread.
    fn process(&mut self, snapshot: PriceSnapshot) {
        if self.last_timestamp == Some(snapshot.timestamp) {
            tracing::debug!("[{}] duplicate tick {}", self.pair, snapshot.timestamp);
            return;
        }
        let mid = snapshot.mid();
        if !mid.is_finite() {
            tracing::warn!("[{}] dropping non-finite mid price", self.pair);
            return;
        }

        let started = std::time::Instant::now();
        self.last_timestamp = Some(snapshot.timestamp);

        let latency_ms = chrono::Utc::now().timestamp_millis() - snapshot.timestamp;
        let sample = LatencySample {
            timestamp: snapshot.timestamp,
            latency_ms,
        };
        self.status.record_latency(sample);
        if let Some(tx) = &self.latency_tx {
            let _ = tx.send(sample);
        }

        let prev_sign = self.prev_sign;
        let (fast, slow, diff) = self.advance(mid);
        self.status
            .record_series_point(&self.pair, snapshot.timestamp, mid, fast, slow, diff);

        if let Some(direction) = crossover(prev_sign, sign_of(diff)) {
            let signal = Signal {
                timestamp: snapshot.timestamp,
                direction,
                pair: self.pair.clone(),
                price: mid,
            };
            self.status.record_signal(&signal);
            tracing::info!("[{}] {} signal at {}", self.pair, direction, mid);
            if self.signal_tx.send(signal).is_err() {
                tracing::warn!("[{}] signal consumer gone", self.pair);
            }
        }

        self.status
            .push_log(format!("[{}]{}ms || {} {}", self.pair, latency_ms, mid, diff));
        self.status.count_snapshot();
        self.status.record_calc_time(started.elapsed().as_secs_f64());
    }

    /// Advance both averages one step and refresh the spread sign.
    fn advance(&mut self, value: f64) -> (f64, f64, f64) {
        let fast = self.ema_fast.update(value);
        let slow = self.ema_slow.update(value);
        let diff = fast - slow;
        self.prev_sign = Some(sign_of(diff));
        (fast, slow, diff)
    }
}
