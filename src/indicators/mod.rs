// Indicators Module - Pure calculators producing aligned arrays
// No detector state here; these are plain math over candle slices

pub mod bollinger;
pub mod moving_average;
pub mod wavetrend;

// Re-export commonly used items for convenience
pub use bollinger::{band_width, BandWidthPoint, BandWidthSeries};
pub use moving_average::{ema_first_seeded, ema_sma_seeded, rolling_max, rolling_min, sma};
pub use wavetrend::{wavetrend, WaveTrendSeries, MIN_CANDLES, OVERBOUGHT, OVERSOLD};
