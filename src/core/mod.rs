// Core Module - Foundational types, errors, config and logging
// Shared by indicators, detectors, state stores and the engine

pub mod config;
pub mod errors;
pub mod logger;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{
    BbwConfig, ConfigError, DedupConfig, EmaConfig, EngineConfig, LoggingConfig, ScannerConfig,
    SmaConfig, WaveTrendConfig, get_config, init_config,
};
pub use errors::{AnalysisError, ProviderError, StoreError};
pub use logger::{setup_from_config, setup_logging};
pub use types::*;
