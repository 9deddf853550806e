// Bollinger Band Width - basis, sample stdev, normalized width and the
// rolling contraction floor the squeeze detector compares against

use crate::core::errors::AnalysisError;
use crate::indicators::moving_average::{rolling_max, rolling_min, sma};

/// Aligned BBW output arrays. Entries are NaN before `first_valid`
/// (width) and `first_window_valid` (contraction window).
#[derive(Debug, Clone)]
pub struct BandWidthSeries {
    pub basis: Vec<f64>,
    pub stdev: Vec<f64>,
    pub width: Vec<f64>,
    pub lowest_contraction: Vec<f64>,
    pub highest_expansion: Vec<f64>,
    pub first_valid: usize,
    pub first_window_valid: usize,
}

/// Snapshot of the most recent fully-valid index.
#[derive(Debug, Clone, Copy)]
pub struct BandWidthPoint {
    pub index: usize,
    pub width: f64,
    pub lowest_contraction: f64,
    pub highest_expansion: f64,
}

impl BandWidthSeries {
    pub fn len(&self) -> usize {
        self.width.len()
    }

    pub fn is_empty(&self) -> bool {
        self.width.is_empty()
    }

    /// Latest index with both width and contraction window defined.
    pub fn latest(&self) -> Option<BandWidthPoint> {
        let index = self.width.len().checked_sub(1)?;
        let width = self.width[index];
        let lowest = self.lowest_contraction[index];
        let highest = self.highest_expansion[index];
        if width.is_nan() || lowest.is_nan() {
            return None;
        }
        Some(BandWidthPoint {
            index,
            width,
            lowest_contraction: lowest,
            highest_expansion: highest,
        })
    }
}

/// Minimum candle count for a given parameter pair.
pub fn required_candles(length: usize, contraction_length: usize) -> usize {
    length + contraction_length
}

/// Compute BBW arrays over closes.
///
/// width = (2 * multiplier * stdev / basis) * 100, with the stdev taken as
/// the sample deviation (divisor length - 1) of the basis window.
pub fn band_width(
    closes: &[f64],
    length: usize,
    multiplier: f64,
    contraction_length: usize,
) -> Result<BandWidthSeries, AnalysisError> {
    let required = required_candles(length, contraction_length);
    if closes.len() < required {
        return Err(AnalysisError::insufficient(required, closes.len()));
    }

    let basis = sma(closes, length);
    let mut stdev = vec![f64::NAN; closes.len()];
    let mut width = vec![f64::NAN; closes.len()];

    for i in (length - 1)..closes.len() {
        let window = &closes[i + 1 - length..=i];
        let mean = basis[i];
        let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / (length as f64 - 1.0);
        let sd = var.sqrt();
        stdev[i] = sd;
        width[i] = (2.0 * multiplier * sd / mean) * 100.0;
    }

    let lowest_contraction = rolling_min(&width, contraction_length);
    let highest_expansion = rolling_max(&width, contraction_length);

    Ok(BandWidthSeries {
        basis,
        stdev,
        width,
        lowest_contraction,
        highest_expansion,
        first_valid: length - 1,
        first_window_valid: length + contraction_length - 2,
    })
}

// ============================================================================
// TESTS
// ============================================================================
