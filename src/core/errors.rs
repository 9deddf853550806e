// Error Taxonomy - Shared error types for analysis, storage and providers
// Nothing here is process-fatal; callers log, skip the affected unit and continue

use thiserror::Error;

/// Errors produced while computing indicators over a candle series.
///
/// `InsufficientData` means "no signal", never a failure: detectors that
/// cannot see enough history simply stay quiet for that symbol this cycle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient data: need {required} candles, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid candle data: {0}")]
    InvalidCandle(String),
}

impl AnalysisError {
    pub fn insufficient(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

/// Errors from the key-value state stores backing dedup and escalation.
///
/// Read failures are handled fail-open (missing record assumed), write
/// failures are logged and the event is still forwarded once.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failures reported by external collaborators (candle feeds, symbol
/// universe, notification transport).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ============================================================================
// TESTS
// ============================================================================
