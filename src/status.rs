use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::models::{LatencySample, Signal, TradeRecord};

/// Retention cap for the dashboard history buffers.
pub const STATUS_RETENTION: usize = 1000;

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T) {
    if buffer.len() == STATUS_RETENTION {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// Per-instrument indicator history mirrored for the dashboard.
///
/// Parallel ring buffers; all five columns always have the same length.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorSeries {
    pub timestamps: VecDeque<i64>,
    pub mids: VecDeque<f64>,
    pub ema_fast: VecDeque<f64>,
    pub ema_slow: VecDeque<f64>,
    pub diff: VecDeque<f64>,
}

impl IndicatorSeries {
    fn push(&mut self, timestamp: i64, mid: f64, fast: f64, slow: f64, diff: f64) {
        push_bounded(&mut self.timestamps, timestamp);
        push_bounded(&mut self.mids, mid);
        push_bounded(&mut self.ema_fast, fast);
        push_bounded(&mut self.ema_slow, slow);
        push_bounded(&mut self.diff, diff);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[derive(Debug, Default)]
struct StatusInner {
    profit: f64,
    roi: f64,
    trades: Vec<TradeRecord>,
    signals: VecDeque<Signal>,
    log: VecDeque<String>,
    calc_times: VecDeque<f64>,
    latencies: VecDeque<LatencySample>,
    series: HashMap<String, IndicatorSeries>,
    snapshots_processed: u64,
    stale_discards: u64,
    rejected_sells: u64,
}

/// Aggregate pipeline state shared between tasks and the dashboard.
///
/// Writers take the lock per recorded event; readers get clones, so no
/// lock is held across serialization or I/O.
#[derive(Clone)]
pub struct StatusBoard {
    session_id: i64,
    inner: Arc<Mutex<StatusInner>>,
}

impl StatusBoard {
    /// `session_id` is the process start in epoch milliseconds; it keys the
    /// latency batches and anchors `profit_per_second`.
    pub fn new(session_id: i64) -> Self {
        Self {
            session_id,
            inner: Arc::new(Mutex::new(StatusInner::default())),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn push_log(&self, line: String) {
        push_bounded(&mut self.inner.lock().unwrap().log, line);
    }

    pub fn record_calc_time(&self, seconds: f64) {
        push_bounded(&mut self.inner.lock().unwrap().calc_times, seconds);
    }

    pub fn record_latency(&self, sample: LatencySample) {
        push_bounded(&mut self.inner.lock().unwrap().latencies, sample);
    }

    pub fn record_signal(&self, signal: &Signal) {
        push_bounded(&mut self.inner.lock().unwrap().signals, signal.clone());
    }

    pub fn record_trade(&self, trade: TradeRecord) {
        self.inner.lock().unwrap().trades.push(trade);
    }

    pub fn add_profit(&self, pnl: f64, roi: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.profit += pnl;
        inner.roi += roi;
    }

    pub fn record_series_point(
        &self,
        pair: &str,
        timestamp: i64,
        mid: f64,
        fast: f64,
        slow: f64,
        diff: f64,
    ) {
        self.inner
            .lock()
            .unwrap()
            .series
            .entry(pair.to_string())
            .or_default()
            .push(timestamp, mid, fast, slow, diff);
    }

    pub fn count_snapshot(&self) {
        self.inner.lock().unwrap().snapshots_processed += 1;
    }

    pub fn count_stale_discard(&self) {
        self.inner.lock().unwrap().stale_discards += 1;
    }

    pub fn count_rejected_sell(&self) {
        self.inner.lock().unwrap().rejected_sells += 1;
    }

    pub fn profit(&self) -> f64 {
        self.inner.lock().unwrap().profit
    }

    pub fn roi(&self) -> f64 {
        self.inner.lock().unwrap().roi
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.inner.lock().unwrap().trades.clone()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.inner.lock().unwrap().signals.iter().cloned().collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.iter().cloned().collect()
    }

    pub fn calc_times(&self) -> Vec<f64> {
        self.inner.lock().unwrap().calc_times.iter().copied().collect()
    }

    pub fn latencies(&self) -> Vec<LatencySample> {
        self.inner.lock().unwrap().latencies.iter().copied().collect()
    }

    pub fn series(&self) -> HashMap<String, IndicatorSeries> {
        self.inner.lock().unwrap().series.clone()
    }

    pub fn snapshots_processed(&self) -> u64 {
        self.inner.lock().unwrap().snapshots_processed
    }

    pub fn stale_discards(&self) -> u64 {
        self.inner.lock().unwrap().stale_discards
    }

    pub fn rejected_sells(&self) -> u64 {
        self.inner.lock().unwrap().rejected_sells
    }

    /// Realized profit per second of uptime at clock value `now_ms`.
    pub fn profit_per_second(&self, now_ms: i64) -> f64 {
        let elapsed_ms = (now_ms - self.session_id).max(1);
        self.profit() / (elapsed_ms as f64 / 1000.0)
    }
}
