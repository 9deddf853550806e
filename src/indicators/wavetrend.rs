// WaveTrend Oscillator - the CipherB wt1/wt2 pair over typical price
// Constants are fixed on purpose: alerts must match the charting script

use crate::core::errors::AnalysisError;
use crate::core::types::Candle;
use crate::indicators::moving_average::{ema_first_seeded, sma};

pub const CHANNEL_LEN: usize = 9;
pub const AVERAGE_LEN: usize = 12;
pub const MA_LEN: usize = 3;
pub const OVERSOLD: f64 = -60.0;
pub const OVERBOUGHT: f64 = 60.0;
pub const MIN_CANDLES: usize = 25;

/// Aligned wt1/wt2 arrays. wt1 is defined from index 0, wt2 from
/// index MA_LEN - 1.
#[derive(Debug, Clone)]
pub struct WaveTrendSeries {
    pub wt1: Vec<f64>,
    pub wt2: Vec<f64>,
}

impl WaveTrendSeries {
    pub fn len(&self) -> usize {
        self.wt1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wt1.is_empty()
    }
}

/// Compute the WaveTrend chain over a candle series:
/// src = hlc3, esa = EMA(src, 9), de = EMA(|src - esa|, 9),
/// ci = (src - esa) / (0.015 * de), wt1 = EMA(ci, 12), wt2 = SMA(wt1, 3).
pub fn wavetrend(candles: &[Candle]) -> Result<WaveTrendSeries, AnalysisError> {
    if candles.len() < MIN_CANDLES {
        return Err(AnalysisError::insufficient(MIN_CANDLES, candles.len()));
    }

    let src: Vec<f64> = candles.iter().map(|c| c.hlc3()).collect();
    let esa = ema_first_seeded(&src, CHANNEL_LEN);

    let deviation: Vec<f64> = src
        .iter()
        .zip(esa.iter())
        .map(|(s, e)| (s - e).abs())
        .collect();
    let de = ema_first_seeded(&deviation, CHANNEL_LEN);

    // Flat series has de == 0; the channel index is defined as 0 there
    let ci: Vec<f64> = src
        .iter()
        .zip(esa.iter())
        .zip(de.iter())
        .map(|((s, e), d)| {
            if *d == 0.0 {
                0.0
            } else {
                (s - e) / (0.015 * d)
            }
        })
        .collect();

    let wt1 = ema_first_seeded(&ci, AVERAGE_LEN);
    let wt2 = sma(&wt1, MA_LEN);

    Ok(WaveTrendSeries { wt1, wt2 })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(i as i64 * 7_200_000, c, c * 1.001, c * 0.999, c, 1_000.0)
            })
            .collect()
    }

    #[test]
    fn test_too_few_candles() {
        let candles = candles_from_closes(&vec![100.0; 24]);
        let err = wavetrend(&candles).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_flat_series_is_zero() {
        let candles = candles_from_closes(&vec![100.0; 40]);
        let wt = wavetrend(&candles).unwrap();
        assert!(wt.wt1.iter().all(|v| *v == 0.0));
        assert_eq!(wt.wt2[MA_LEN - 1], 0.0);
        assert_eq!(*wt.wt2.last().unwrap(), 0.0);
    }

    #[test]
    fn test_sustained_decline_goes_deeply_negative() {
        let mut closes = Vec::new();
        let mut price = 100.0;
        for _ in 0..50 {
            closes.push(price);
            price *= 0.99;
        }
        let candles = candles_from_closes(&closes);
        let wt = wavetrend(&candles).unwrap();
        let last1 = *wt.wt1.last().unwrap();
        let last2 = *wt.wt2.last().unwrap();
        assert!(last1 < -50.0, "wt1 was {}", last1);
        assert!(last2 < -50.0, "wt2 was {}", last2);
    }

    #[test]
    fn test_sustained_rally_mirrors_decline() {
        let mut down = Vec::new();
        let mut price = 100.0;
        for _ in 0..50 {
            down.push(price);
            price *= 0.99;
        }
        // Mirror highs/lows too so hlc3 reflects exactly around 200
        let mirrored: Vec<Candle> = down
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(
                    i as i64 * 7_200_000,
                    200.0 - c,
                    200.0 - c * 0.999,
                    200.0 - c * 1.001,
                    200.0 - c,
                    1_000.0,
                )
            })
            .collect();

        let wt_down = wavetrend(&candles_from_closes(&down)).unwrap();
        let wt_up = wavetrend(&mirrored).unwrap();
        for (a, b) in wt_down.wt1.iter().zip(wt_up.wt1.iter()) {
            assert!((a + b).abs() < 1e-6, "wt1 not mirrored: {} vs {}", a, b);
        }
        assert!(*wt_up.wt1.last().unwrap() > 50.0);
    }
}
