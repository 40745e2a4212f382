use std::collections::HashMap;

use tokio::sync::{mpsc, watch};

use crate::models::{Direction, Signal, TradeRecord};
use crate::status::StatusBoard;

/// Signals older than this on arrival are discarded unexecuted.
pub const STALENESS_THRESHOLD_MS: i64 = 5_000;

/// `stake` is the entry price of the open position.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Flat,
    Long { stake: f64 },
}

/// What the executor did with one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SignalOutcome {
    Stale,
    Opened,
    Closed { pnl: f64, roi: f64 },
    RejectedNoProfit,
    Ignored,
}

/// Consumes the shared signal stream and runs a flat/long position per
/// instrument. Only sells that close at a profit are executed.
pub struct Executor {
    positions: HashMap<String, Position>,
    rx: mpsc::UnboundedReceiver<Signal>,
    status: StatusBoard,
    shutdown: watch::Receiver<bool>,
}

impl Executor {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Signal>,
        status: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            positions: HashMap::new(),
            rx,
            status,
            shutdown,
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
                        Some(signal) => {
                            let now_ms = chrono::Utc::now().timestamp_millis();
                            self.handle(signal, now_ms);
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::debug!("executor stopped");
    }

    fn handle(&mut self, signal: Signal, now_ms: i64) -> SignalOutcome {
        let age_ms = now_ms - signal.timestamp;
        if age_ms >= STALENESS_THRESHOLD_MS {
            self.status.count_stale_discard();
            tracing::debug!(
                "[{}] discarding {} signal, {}ms old",
                signal.pair,
                signal.direction,
                age_ms
            );
            return SignalOutcome::Stale;
        }

        let position = self
            .positions
            .entry(signal.pair.clone())
            .or_insert(Position::Flat);

        match (*position, signal.direction) {
            (Position::Flat, Direction::Buy) => {
                *position = Position::Long {
                    stake: signal.price,
                };
                self.status
                    .record_trade(TradeRecord::buy(signal.timestamp, &signal.pair, signal.price));
                tracing::info!("[{}] opened long at {}", signal.pair, signal.price);
                SignalOutcome::Opened
            }
            (Position::Long { stake }, Direction::Sell) => {
                let pnl = signal.price - stake;
                if pnl <= 0.0 {
                    self.status.count_rejected_sell();
                    tracing::info!(
                        "[{}] no sell at {}, profit would be {:.4}",
                        signal.pair,
                        signal.price,
                        pnl
                    );
                    return SignalOutcome::RejectedNoProfit;
                }

                let roi = pnl / stake;
                *position = Position::Flat;
                self.status.add_profit(pnl, roi);
                self.status.record_trade(TradeRecord::sell(
                    signal.timestamp,
                    &signal.pair,
                    signal.price,
                    pnl,
                    roi,
                ));
                tracing::info!(
                    "[{}] closed long at {}, pnl {:.4} roi {:.4}",
                    signal.pair,
                    signal.price,
                    pnl,
                    roi
                );
                SignalOutcome::Closed { pnl, roi }
            }
            _ => SignalOutcome::Ignored,
        }
    }
}
