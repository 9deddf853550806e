// Moving Averages - SMA, EMA and rolling window extrema over aligned arrays
// Outputs keep input length; entries before enough history exist are NaN

/// Simple moving average. `out[i]` is NaN until a full window exists.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || period > values.len() {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Recursive EMA seeded with the SMA of the first `period` values, the
/// convention the MA crossover detector specifies.
pub fn ema_sma_seeded(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || period > values.len() {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    for i in period..values.len() {
        out[i] = out[i - 1] + k * (values[i] - out[i - 1]);
    }
    out
}

/// Recursive EMA seeded with the first value, the charting convention the
/// WaveTrend chain relies on. Defined from index 0.
pub fn ema_first_seeded(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.is_empty() {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    out[0] = values[0];
    for i in 1..values.len() {
        out[i] = out[i - 1] + k * (values[i] - out[i - 1]);
    }
    out
}

/// Rolling minimum over a trailing window. NaN until the window is full
/// or while the window still covers NaN inputs.
pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || window > values.len() {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = slice.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    }
    out
}

/// Rolling maximum over a trailing window, same validity rules as
/// `rolling_min`.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || window > values.len() {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = slice.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
