// Detectors Module - stateful signal detection on top of the indicators
// Each detector turns indicator series into SignalEvents for one timeframe

pub mod cipher;
pub mod ema_cross;
pub mod sma_cross;
pub mod squeeze;

pub use cipher::{CipherDetector, CipherDetectorStats};
pub use ema_cross::{EmaCrossDetector, EmaCrossDetectorStats};
pub use sma_cross::{SmaCrossDetector, SmaCrossDetectorStats};
pub use squeeze::{SqueezeDetector, SqueezeDetectorStats};
