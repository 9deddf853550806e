// Squeeze Detector - BBW touching its contraction floor, edge-triggered
// Hysteresis state lives in memory per run; the dedup store is separate

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::core::types::{CandleSeries, SignalDetails, SignalEvent};
use crate::indicators::bollinger::BandWidthSeries;

/// Per symbol/timeframe squeeze condition detector.
///
/// Two suppression layers on top of the raw touch test:
/// - entry edge: only the false -> true transition of the touch emits
/// - separation: a new signal must sit on a contraction floor at least
///   `separation_threshold` BBW points away from the previous emitted one
pub struct SqueezeDetector {
    tolerance: f64,
    separation_threshold: f64,

    // Keyed by "symbol|timeframe"
    touching: HashMap<String, bool>,
    last_emitted_floor: HashMap<String, f64>,

    evaluations: u64,
    signals_emitted: u64,
    suppressed_separation: u64,
}

impl SqueezeDetector {
    pub fn new(tolerance: f64, separation_threshold: f64) -> Self {
        Self {
            tolerance,
            separation_threshold,
            touching: HashMap::new(),
            last_emitted_floor: HashMap::new(),
            evaluations: 0,
            signals_emitted: 0,
            suppressed_separation: 0,
        }
    }

    fn state_key(series: &CandleSeries) -> String {
        format!("{}|{}", series.symbol, series.timeframe)
    }

    /// Evaluate the latest index of a BBW computation. Returns a squeeze
    /// event on the entry edge, subject to the separation rule.
    pub fn evaluate(
        &mut self,
        series: &CandleSeries,
        bands: &BandWidthSeries,
    ) -> Option<SignalEvent> {
        self.evaluations += 1;

        let point = bands.latest()?;
        let latest = series.latest()?;
        let key = Self::state_key(series);

        let is_touching = (point.width - point.lowest_contraction).abs() <= self.tolerance;
        let was_touching = self.touching.insert(key.clone(), is_touching).unwrap_or(false);

        if !is_touching || was_touching {
            return None;
        }

        if let Some(prev_floor) = self.last_emitted_floor.get(&key) {
            if (point.lowest_contraction - prev_floor).abs() <= self.separation_threshold {
                self.suppressed_separation += 1;
                debug!(
                    "squeeze suppressed by separation: {} {} floor={:.4} prev={:.4}",
                    series.symbol, series.timeframe, point.lowest_contraction, prev_floor
                );
                return None;
            }
        }

        self.last_emitted_floor
            .insert(key, point.lowest_contraction);
        self.signals_emitted += 1;
        info!(
            "squeeze detected: {} {} width={:.4} floor={:.4}",
            series.symbol, series.timeframe, point.width, point.lowest_contraction
        );

        Some(SignalEvent::new(
            series.symbol.clone(),
            series.timeframe,
            latest.open_time,
            SignalDetails::Squeeze {
                width: point.width,
                contraction_floor: point.lowest_contraction,
            },
        ))
    }

    pub fn get_stats(&self) -> SqueezeDetectorStats {
        SqueezeDetectorStats {
            evaluations: self.evaluations,
            signals_emitted: self.signals_emitted,
            suppressed_separation: self.suppressed_separation,
            tracked_keys: self.touching.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqueezeDetectorStats {
    pub evaluations: u64,
    pub signals_emitted: u64,
    pub suppressed_separation: u64,
    pub tracked_keys: usize,
}

impl fmt::Display for SqueezeDetectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Squeeze(evals={}, emitted={}, sep_suppressed={}, keys={})",
            self.evaluations, self.signals_emitted, self.suppressed_separation, self.tracked_keys
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
