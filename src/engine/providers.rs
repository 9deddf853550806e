// External Collaborators - contracts the scan engine consumes
// Candle data, the symbol universe, and alert delivery all live behind traits

use async_trait::async_trait;
use tracing::info;

use crate::core::errors::ProviderError;
use crate::core::types::{Alert, CandleSeries, Timeframe};

/// Source of candle data, typically an exchange REST client.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Fetch at least `min_candles` of the most recent candles for the
    /// pair. Providers may return more. The newest candle may still be
    /// forming; detectors decide which index they trust.
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        min_candles: usize,
    ) -> Result<CandleSeries, ProviderError>;
}

/// Source of the symbols to scan. Market-cap and volume filtering happens
/// upstream of this contract.
#[async_trait]
pub trait AssetUniverse: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>, ProviderError>;
}

/// Delivery channel for accepted alerts.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, alerts: &[Alert]) -> Result<(), ProviderError>;
}

// ============================================================================
// BUILT-IN IMPLEMENTATIONS
// ============================================================================

/// Fixed symbol list, for tests and single-shot runs.
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new<S: Into<String>>(symbols: Vec<S>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AssetUniverse for StaticUniverse {
    async fn symbols(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.symbols.clone())
    }
}

/// Writes alerts to the log. The fallback sink when no delivery channel
/// is wired up.
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, alerts: &[Alert]) -> Result<(), ProviderError> {
        for alert in alerts {
            info!("ALERT {}", alert);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_universe_returns_symbols() {
        let universe = StaticUniverse::new(vec!["BTCUSDT", "ETHUSDT"]);
        let symbols = universe.symbols().await.unwrap();
        assert_eq!(symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_empty_batch() {
        assert!(LogNotifier.send(&[]).await.is_ok());
    }
}
