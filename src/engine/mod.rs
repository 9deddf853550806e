// Engine Module - scan cycle orchestration around the detector core
// Providers feed candles in; the arbiter gates what leaves as alerts

pub mod arbiter;
pub mod providers;
pub mod scanner;

// Re-export commonly used items for convenience
pub use arbiter::{ArbiterStats, SignalArbiter, SymbolReport};
pub use providers::{
    AssetUniverse, CandleProvider, LogNotifier, NotificationSender, StaticUniverse,
};
pub use scanner::{CycleReport, EngineStats, ScanEngine};
