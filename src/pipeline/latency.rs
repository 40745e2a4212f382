use tokio::sync::{mpsc, watch};

use crate::models::LatencySample;
use crate::persistence::LatencyStore;

/// Buffers latency samples from every indicator engine and merges them into
/// the session archive once a full batch has accumulated. The buffer
/// survives a failed flush and is retried with the next batch.
pub struct LatencyMonitor {
    rx: mpsc::UnboundedReceiver<LatencySample>,
    store: LatencyStore,
    batch_size: usize,
    buffer: Vec<LatencySample>,
    shutdown: watch::Receiver<bool>,
}

impl LatencyMonitor {
    pub fn new(
        rx: mpsc::UnboundedReceiver<LatencySample>,
        store: LatencyStore,
        batch_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rx,
            store,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
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
                        Some(sample) => self.absorb(sample),
                        None => break,
                    }
                }
            }
        }

        // Pick up whatever the engines managed to queue before stopping,
        // then write the partial batch.
        while let Ok(sample) = self.rx.try_recv() {
            self.buffer.push(sample);
        }
        if !self.buffer.is_empty() {
            self.flush_buffer();
        }

        tracing::debug!("latency monitor stopped");
    }

    fn absorb(&mut self, sample: LatencySample) {
        self.buffer.push(sample);
        if self.buffer.len() >= self.batch_size {
            self.flush_buffer();
        }
    }

    fn flush_buffer(&mut self) {
        match self.store.flush(&self.buffer) {
            Ok(total) => {
                tracing::debug!(
                    "flushed {} latency samples ({} archived)",
                    self.buffer.len(),
                    total
                );
                self.buffer.clear();
            }
            Err(e) => {
                tracing::error!("latency flush failed, keeping {} samples: {}", self.buffer.len(), e);
            }
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
