// Market Sentry - multi-timeframe indicator scanning with deduplicated alerts
// Candles come in through a provider; accepted signals leave through a notifier

pub mod core;
pub mod detectors;
pub mod engine;
pub mod indicators;
pub mod state;

// Re-export the surface most callers need
pub use crate::core::config::{get_config, init_config, ScannerConfig};
pub use crate::core::errors::{AnalysisError, ProviderError, StoreError};
pub use crate::core::logger::{setup_from_config, setup_logging};
pub use crate::core::types::{
    Alert, AlertTier, Candle, CandleSeries, MaKind, SignalDetails, SignalDirection, SignalEvent,
    SignalKind, Timeframe,
};
pub use crate::engine::{
    AssetUniverse, CandleProvider, CycleReport, LogNotifier, NotificationSender, ScanEngine,
    StaticUniverse,
};
