// SMA Trend Detector - long-horizon SMA crosses, ranging markets, and
// price proximity to the SMA levels. At most one signal per evaluation.

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::core::types::{CandleSeries, MaKind, MarketTrend, SignalDetails, SignalEvent};

/// SMA(fast) vs SMA(slow) trend structure on one timeframe.
///
/// Priority per evaluation: crossover, then ranging entry, then proximity.
/// Ranging is edge-triggered per episode; proximity repeats are throttled
/// downstream per level.
pub struct SmaCrossDetector {
    fast_period: usize,
    slow_period: usize,
    ranging_pct: f64,
    proximity_pct: f64,

    in_ranging: HashMap<String, bool>,

    evaluations: u64,
    cross_signals: u64,
    ranging_signals: u64,
    proximity_signals: u64,
}

impl SmaCrossDetector {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        ranging_pct: f64,
        proximity_pct: f64,
    ) -> Self {
        Self {
            fast_period,
            slow_period,
            ranging_pct,
            proximity_pct,
            in_ranging: HashMap::new(),
            evaluations: 0,
            cross_signals: 0,
            ranging_signals: 0,
            proximity_signals: 0,
        }
    }

    pub fn evaluate(
        &mut self,
        series: &CandleSeries,
        fast: &[f64],
        slow: &[f64],
    ) -> Option<SignalEvent> {
        self.evaluations += 1;

        let len = series.len();
        if len < 2 || fast.len() != len || slow.len() != len {
            return None;
        }
        let i = len - 1;
        let (f, s) = (fast[i], slow[i]);
        let (pf, ps) = (fast[i - 1], slow[i - 1]);
        if f.is_nan() || s.is_nan() || pf.is_nan() || ps.is_nan() {
            return None;
        }
        let latest = series.latest()?;
        let price = latest.close;
        let key = format!("{}|{}", series.symbol, series.timeframe);

        // Episode state tracks every evaluation, including cross cycles.
        // The gap normalizes by the midpoint of the two SMAs.
        let gap_pct = (f - s).abs() / ((f + s) / 2.0) * 100.0;
        let now_ranging = gap_pct <= self.ranging_pct;
        let was_ranging = self.in_ranging.insert(key, now_ranging).unwrap_or(false);

        if pf <= ps && f > s {
            self.cross_signals += 1;
            info!(
                "sma golden cross: {} {} sma{}={:.4} sma{}={:.4}",
                series.symbol, series.timeframe, self.fast_period, f, self.slow_period, s
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                latest.open_time,
                SignalDetails::GoldenCross {
                    ma: MaKind::Sma,
                    fast_period: self.fast_period,
                    slow_period: self.slow_period,
                    fast_value: f,
                    slow_value: s,
                },
            ));
        }
        if pf >= ps && f < s {
            self.cross_signals += 1;
            info!(
                "sma death cross: {} {} sma{}={:.4} sma{}={:.4}",
                series.symbol, series.timeframe, self.fast_period, f, self.slow_period, s
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                latest.open_time,
                SignalDetails::DeathCross {
                    ma: MaKind::Sma,
                    fast_period: self.fast_period,
                    slow_period: self.slow_period,
                    fast_value: f,
                    slow_value: s,
                },
            ));
        }

        if now_ranging {
            if was_ranging {
                debug!(
                    "ranging continues: {} {} gap={:.3}%",
                    series.symbol, series.timeframe, gap_pct
                );
                return None;
            }
            self.ranging_signals += 1;
            info!(
                "ranging market: {} {} gap={:.3}%",
                series.symbol, series.timeframe, gap_pct
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                latest.open_time,
                SignalDetails::Ranging {
                    gap_pct,
                    sma_fast: f,
                    sma_slow: s,
                },
            ));
        }

        self.check_proximity(series, price, f, s, latest.open_time)
    }

    /// Price near one of the SMA levels, on the side the trend supports:
    /// the SMA acts as support in an uptrend and resistance in a downtrend.
    /// The fast SMA is checked first.
    fn check_proximity(
        &mut self,
        series: &CandleSeries,
        price: f64,
        fast: f64,
        slow: f64,
        signal_time: i64,
    ) -> Option<SignalEvent> {
        let trend = if fast > slow {
            MarketTrend::Bullish
        } else {
            MarketTrend::Bearish
        };
        let levels = [(self.fast_period, fast), (self.slow_period, slow)];

        for (period, level) in levels {
            let distance_pct = (price - level).abs() / level * 100.0;
            if distance_pct > self.proximity_pct {
                continue;
            }
            let details = match trend {
                MarketTrend::Bullish if price >= level => SignalDetails::SupportProximity {
                    ma: MaKind::Sma,
                    period,
                    level,
                    price,
                    distance_pct,
                },
                MarketTrend::Bearish if price <= level => SignalDetails::ResistanceProximity {
                    ma: MaKind::Sma,
                    period,
                    level,
                    price,
                    distance_pct,
                },
                _ => continue,
            };
            self.proximity_signals += 1;
            info!(
                "sma proximity: {} {} trend={} price={:.4} sma{}={:.4} dist={:.3}%",
                series.symbol, series.timeframe, trend, price, period, level, distance_pct
            );
            return Some(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                signal_time,
                details,
            ));
        }
        None
    }

    pub fn get_stats(&self) -> SmaCrossDetectorStats {
        SmaCrossDetectorStats {
            evaluations: self.evaluations,
            cross_signals: self.cross_signals,
            ranging_signals: self.ranging_signals,
            proximity_signals: self.proximity_signals,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmaCrossDetectorStats {
    pub evaluations: u64,
    pub cross_signals: u64,
    pub ranging_signals: u64,
    pub proximity_signals: u64,
}

impl fmt::Display for SmaCrossDetectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SmaCross(evals={}, crosses={}, ranging={}, proximity={})",
            self.evaluations, self.cross_signals, self.ranging_signals, self.proximity_signals
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Candle, SignalKind, Timeframe};
    use crate::indicators::moving_average::sma;

    fn make_series(closes: &[f64]) -> CandleSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(i as i64 * 86_400_000, c, c * 1.001, c * 0.999, c, 100.0)
            })
            .collect();
        CandleSeries::new("ETHUSDT", Timeframe::D1, candles)
    }

    fn eval(detector: &mut SmaCrossDetector, closes: &[f64]) -> Option<SignalEvent> {
        let series = make_series(closes);
        let fast = sma(closes, 2);
        let slow = sma(closes, 4);
        detector.evaluate(&series, &fast, &slow)
    }

    #[test]
    fn test_golden_cross_fires_unconditionally() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        let event = eval(&mut detector, &[10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 9.0]);
        let event = event.expect("golden cross expected");
        assert_eq!(event.kind(), SignalKind::GoldenCross);
        match event.details {
            SignalDetails::GoldenCross { ma, fast_value, slow_value, .. } => {
                assert_eq!(ma, MaKind::Sma);
                assert!(fast_value > slow_value);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_death_cross_fires_unconditionally() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        let event = eval(&mut detector, &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 11.0]);
        assert_eq!(
            event.expect("death cross expected").kind(),
            SignalKind::DeathCross
        );
    }

    #[test]
    fn test_ranging_fires_once_per_episode() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        let base = [10.0, 10.02, 10.0, 10.01, 10.0, 10.01];

        // Entry into the episode fires
        let entry = eval(&mut detector, &base);
        assert_eq!(entry.expect("ranging expected").kind(), SignalKind::Ranging);

        // Still ranging next cycle: silent
        let mut extended = base.to_vec();
        extended.push(10.0);
        assert!(eval(&mut detector, &extended).is_none());

        // A breakout widens the gap and crosses the SMAs; the cross wins
        // and the episode ends
        extended.push(14.0);
        let breakout = eval(&mut detector, &extended);
        assert_eq!(
            breakout.expect("cross expected").kind(),
            SignalKind::GoldenCross
        );

        // Gap converges again: a fresh episode fires a fresh signal
        extended.extend_from_slice(&[10.0, 10.0, 10.0, 10.0]);
        let reentry = eval(&mut detector, &extended);
        assert_eq!(
            reentry.expect("ranging expected").kind(),
            SignalKind::Ranging
        );
        assert_eq!(detector.get_stats().ranging_signals, 2);
    }

    #[test]
    fn test_ranging_band_normalizes_by_sma_midpoint() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        // SMA2 = 10050.06, SMA4 = 10000.0: the gap is 0.5006% of the slow
        // SMA alone but 0.49935% of their midpoint, so it sits inside the
        // 0.5% band
        let event = eval(
            &mut detector,
            &[9900.0, 9949.94, 9949.94, 10050.06, 10050.06],
        );
        let event = event.expect("ranging expected");
        assert_eq!(event.kind(), SignalKind::Ranging);
        match event.details {
            SignalDetails::Ranging { gap_pct, sma_fast, sma_slow } => {
                assert!(gap_pct <= 0.5, "gap {} should be inside the band", gap_pct);
                assert!((gap_pct - 0.49935).abs() < 1e-4);
                assert!((sma_fast - sma_slow).abs() / sma_slow * 100.0 > 0.5);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_support_proximity_in_uptrend() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        let event = eval(&mut detector, &[9.0, 9.5, 10.0, 10.5, 10.55]);
        let event = event.expect("support proximity expected");
        assert_eq!(event.kind(), SignalKind::SupportProximity);
        match event.details {
            SignalDetails::SupportProximity { period, level, price, .. } => {
                assert_eq!(period, 2);
                assert!((level - 10.525).abs() < 1e-9);
                assert!((price - 10.55).abs() < 1e-9);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_resistance_proximity_in_downtrend() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        let event = eval(&mut detector, &[11.0, 10.5, 10.0, 9.5, 9.45]);
        let event = event.expect("resistance proximity expected");
        assert_eq!(event.kind(), SignalKind::ResistanceProximity);
        match event.details {
            SignalDetails::ResistanceProximity { period, level, price, .. } => {
                assert_eq!(period, 2);
                assert!((level - 9.475).abs() < 1e-9);
                assert!((price - 9.45).abs() < 1e-9);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_side_proximity_is_silent() {
        let mut detector = SmaCrossDetector::new(2, 4, 0.5, 2.0);
        // Uptrend with price just below the fast SMA: the support side does
        // not apply, and the slow SMA is too far away
        assert!(eval(&mut detector, &[9.0, 9.5, 10.0, 10.5, 10.4]).is_none());
    }
}
