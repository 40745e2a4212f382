use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::Result;

/// Options recognized in the JSON config document.
///
/// Any subset of keys may be present; missing keys keep their defaults and
/// unknown keys are ignored. Fields are declared in alphabetical order so
/// the exported document comes out key-sorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub exchange: String,
    pub latency_logging: bool,
    pub number_of_pairs: usize,
    pub ohlc_limit: u32,
    pub port: u16,
    pub saving_batch_size: usize,
    pub serve_api: bool,
    pub ticker_interval: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            exchange: "kucoin".to_string(),
            latency_logging: true,
            number_of_pairs: 1,
            ohlc_limit: 50,
            port: 3333,
            saving_batch_size: 32,
            serve_api: false,
            ticker_interval: 5.0,
        }
    }
}

impl BotConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| BotError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Bounds keep Duration::from_secs_f64 away from zero and overflow
        if !(self.ticker_interval >= 0.001 && self.ticker_interval <= 86_400.0) {
            return Err(BotError::Config(format!(
                "ticker_interval must be between 0.001 and 86400 seconds, got {}",
                self.ticker_interval
            )));
        }
        if self.number_of_pairs == 0 {
            return Err(BotError::Config("number_of_pairs must be at least 1".into()));
        }
        if self.saving_batch_size == 0 {
            return Err(BotError::Config(
                "saving_batch_size must be at least 1".into(),
            ));
        }
        if self.ohlc_limit == 0 {
            return Err(BotError::Config("ohlc_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Write the effective configuration as pretty-printed, key-sorted JSON.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BotError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Exchange API credentials, loaded from the keyfile.
///
/// Only public endpoints are called, so these are carried by the client but
/// never transmitted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("credentials file {}: {}", path.display(), e))
        })?;
        let creds: Self = serde_json::from_str(&raw).map_err(|e| {
            BotError::Config(format!("credentials file {}: {}", path.display(), e))
        })?;
        if creds.api_key.is_empty() || creds.secret.is_empty() {
            return Err(BotError::Config(
                "credentials must include a non-empty apiKey and secret".into(),
            ));
        }
        Ok(creds)
    }

    /// Truncated key for log lines.
    pub fn masked_key(&self) -> String {
        let head: String = self.api_key.chars().take(4).collect();
        format!("{}***", head)
    }
}
