use thiserror::Error;

/// Failure taxonomy for the pipeline.
///
/// Staleness discards and rejected sells are counted events handled inline
/// by the executor, not errors.
#[derive(Debug, Error)]
pub enum BotError {
    /// Market-data source unreachable or request rejected. Contained to the
    /// feed that hit it; other pipelines keep running.
    #[error("market data source: {0}")]
    DataSource(String),

    /// Malformed market data; the offending sample is dropped.
    #[error("malformed market data: {0}")]
    DataFormat(String),

    #[error("config: {0}")]
    Config(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::DataSource(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = BotError::DataFormat("field buy is not numeric".to_string());
        assert_eq!(
            err.to_string(),
            "malformed market data: field buy is not numeric"
        );
    }

    #[test]
    fn test_io_error_wraps() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BotError = io.into();
        assert!(matches!(err, BotError::Io(_)));
    }
}
