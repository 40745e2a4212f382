use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::models::{Candle, LatencySample};
use crate::Result;

/// Filesystem-safe form of a pair name (`BTC/USDT` -> `BTC-USDT`).
pub fn pair_filesafe(pair: &str) -> String {
    pair.replace('/', "-")
}

/// Create the runtime data directories.
pub fn ensure_dirs(log_dir: &Path, ohlc_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    fs::create_dir_all(ohlc_dir)?;
    Ok(())
}

/// Parallel-array layout of a persisted latency batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencyBatch {
    pub timestamps: Vec<i64>,
    pub latencies_ms: Vec<i64>,
}

impl LatencyBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn extend_from_samples(&mut self, samples: &[LatencySample]) {
        for sample in samples {
            self.timestamps.push(sample.timestamp);
            self.latencies_ms.push(sample.latency_ms);
        }
    }
}

/// Gzip-compressed latency batches, one file per session.
///
/// A flush merges: the stored batch (if any) is loaded, the new samples are
/// appended after it, and the whole batch is rewritten atomically (temp
/// file + rename).
#[derive(Debug, Clone)]
pub struct LatencyStore {
    path: PathBuf,
}

impl LatencyStore {
    pub fn new(log_dir: impl AsRef<Path>, session_id: i64) -> Self {
        Self {
            path: log_dir
                .as_ref()
                .join(format!("latencies-{}.json.gz", session_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted batch for this session, or an empty one.
    pub fn load(&self) -> Result<LatencyBatch> {
        if !self.path.exists() {
            return Ok(LatencyBatch::default());
        }

        let file = File::open(&self.path)?;
        let mut decoder = GzDecoder::new(file);
        let mut raw = String::new();
        decoder.read_to_string(&mut raw)?;
        serde_json::from_str(&raw)
            .map_err(|e| BotError::Persistence(format!("{}: {}", self.path.display(), e)))
    }

    /// Merge `samples` after the stored batch and persist atomically.
    /// Returns the total number of persisted samples.
    pub fn flush(&self, samples: &[LatencySample]) -> Result<usize> {
        let mut batch = self.load()?;
        batch.extend_from_samples(samples);

        let json =
            serde_json::to_vec(&batch).map_err(|e| BotError::Persistence(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        let mut encoder = GzEncoder::new(File::create(&tmp)?, Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
        fs::rename(&tmp, &self.path)?;

        Ok(batch.len())
    }
}

/// JSON candle cache, one file per instrument.
#[derive(Debug, Clone)]
pub struct OhlcCache {
    dir: PathBuf,
}

impl OhlcCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, pair: &str) -> PathBuf {
        self.dir.join(format!("{}.json", pair_filesafe(pair)))
    }

    /// Cached candles for `pair`, `None` when never cached.
    pub fn load(&self, pair: &str) -> Result<Option<Vec<Candle>>> {
        let path = self.path_for(pair);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        let candles = serde_json::from_str(&raw)
            .map_err(|e| BotError::Persistence(format!("{}: {}", path.display(), e)))?;
        Ok(Some(candles))
    }

    pub fn store(&self, pair: &str, candles: &[Candle]) -> Result<()> {
        let json =
            serde_json::to_string(candles).map_err(|e| BotError::Persistence(e.to_string()))?;
        fs::write(self.path_for(pair), json)?;
        Ok(())
    }
}
