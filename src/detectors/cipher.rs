// CipherB Detector - WaveTrend cross in oversold/overbought territory
// Reads the penultimate candle only: the last closed bar, never the forming one

use std::fmt;
use tracing::info;

use crate::core::types::{CandleSeries, SignalDetails, SignalEvent};
use crate::indicators::wavetrend::{WaveTrendSeries, OVERBOUGHT, OVERSOLD};

/// Sign with an explicit zero, so a touch of wt1 == wt2 counts as a
/// boundary in both directions.
fn sign(d: f64) -> i8 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

/// WaveTrend crossover detector. Stateless across cycles; the per-candle
/// cross test carries its own look-back.
pub struct CipherDetector {
    evaluations: u64,
    buy_signals: u64,
    sell_signals: u64,
}

impl CipherDetector {
    pub fn new() -> Self {
        Self {
            evaluations: 0,
            buy_signals: 0,
            sell_signals: 0,
        }
    }

    /// Evaluate the penultimate index of the series. A cross requires the
    /// sign of wt1 - wt2 to differ from the previous index; buys must sit
    /// in oversold territory, sells in overbought. Ties resolve to buy.
    pub fn evaluate(
        &mut self,
        series: &CandleSeries,
        wt: &WaveTrendSeries,
    ) -> Option<SignalEvent> {
        self.evaluations += 1;

        let len = wt.len();
        if len < 4 || series.len() != len {
            return None;
        }
        let i = len - 2;

        let wt1 = wt.wt1[i];
        let wt2 = wt.wt2[i];
        let prev_wt1 = wt.wt1[i - 1];
        let prev_wt2 = wt.wt2[i - 1];
        if wt2.is_nan() || prev_wt2.is_nan() {
            return None;
        }

        let crossed = sign(wt1 - wt2) != sign(prev_wt1 - prev_wt2);
        if !crossed {
            return None;
        }

        let oversold = wt1 <= OVERSOLD && wt2 <= OVERSOLD;
        let overbought = wt2 >= OVERBOUGHT && wt1 >= OVERBOUGHT;
        let signal_time = series.penultimate()?.open_time;

        if (wt2 - wt1) <= 0.0 && oversold {
            self.buy_signals += 1;
            info!(
                "cipher buy: {} {} wt1={:.2} wt2={:.2}",
                series.symbol, series.timeframe, wt1, wt2
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                signal_time,
                SignalDetails::OversoldCross { wt1, wt2 },
            ));
        }

        if (wt2 - wt1) >= 0.0 && overbought {
            self.sell_signals += 1;
            info!(
                "cipher sell: {} {} wt1={:.2} wt2={:.2}",
                series.symbol, series.timeframe, wt1, wt2
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                signal_time,
                SignalDetails::OverboughtCross { wt1, wt2 },
            ));
        }

        None
    }

    pub fn get_stats(&self) -> CipherDetectorStats {
        CipherDetectorStats {
            evaluations: self.evaluations,
            buy_signals: self.buy_signals,
            sell_signals: self.sell_signals,
        }
    }
}

impl Default for CipherDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CipherDetectorStats {
    pub evaluations: u64,
    pub buy_signals: u64,
    pub sell_signals: u64,
}

impl fmt::Display for CipherDetectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cipher(evals={}, buys={}, sells={})",
            self.evaluations, self.buy_signals, self.sell_signals
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
