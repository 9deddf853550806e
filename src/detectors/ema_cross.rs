// EMA Cross Detector - golden/death crosses plus the fast-EMA zone touch
// Zone alerts re-arm only after price moves away from the last alert

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::core::types::{CandleSeries, MaKind, SignalDetails, SignalEvent};

/// Zone-touch hysteresis for one symbol.
#[derive(Debug, Clone, Copy)]
struct ZoneState {
    armed: bool,
    last_alert_price: f64,
}

/// EMA(fast) vs EMA(slow) crossover detection with a price-near-fast-EMA
/// zone touch. Crossover cooldowns live in the dedup layer; the re-arm
/// hysteresis here is in-memory per run.
pub struct EmaCrossDetector {
    fast_period: usize,
    slow_period: usize,
    zone_pct: f64,
    rearm_pct: f64,

    zones: HashMap<String, ZoneState>,

    evaluations: u64,
    cross_signals: u64,
    zone_signals: u64,
    zone_suppressed: u64,
}

impl EmaCrossDetector {
    pub fn new(fast_period: usize, slow_period: usize, zone_pct: f64, rearm_pct: f64) -> Self {
        Self {
            fast_period,
            slow_period,
            zone_pct,
            rearm_pct,
            zones: HashMap::new(),
            evaluations: 0,
            cross_signals: 0,
            zone_signals: 0,
            zone_suppressed: 0,
        }
    }

    /// Evaluate the latest index. May emit a crossover and a zone touch in
    /// the same cycle; they are independent conditions.
    pub fn evaluate(
        &mut self,
        series: &CandleSeries,
        fast: &[f64],
        slow: &[f64],
    ) -> Vec<SignalEvent> {
        self.evaluations += 1;
        let mut events = Vec::new();

        let len = series.len();
        if len < 2 || fast.len() != len || slow.len() != len {
            return events;
        }
        let i = len - 1;
        let (f, s) = (fast[i], slow[i]);
        let (pf, ps) = (fast[i - 1], slow[i - 1]);
        if f.is_nan() || s.is_nan() || pf.is_nan() || ps.is_nan() {
            return events;
        }
        let latest = match series.latest() {
            Some(c) => c,
            None => return events,
        };
        let price = latest.close;

        // Crossovers
        if pf <= ps && f > s {
            self.cross_signals += 1;
            info!(
                "ema golden cross: {} {} fast={:.4} slow={:.4}",
                series.symbol, series.timeframe, f, s
            );
            events.push(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                latest.open_time,
                SignalDetails::GoldenCross {
                    ma: MaKind::Ema,
                    fast_period: self.fast_period,
                    slow_period: self.slow_period,
                    fast_value: f,
                    slow_value: s,
                },
            ));
        } else if pf >= ps && f < s {
            self.cross_signals += 1;
            info!(
                "ema death cross: {} {} fast={:.4} slow={:.4}",
                series.symbol, series.timeframe, f, s
            );
            events.push(SignalEvent::new(
                series.symbol.clone(),
                series.timeframe,
                latest.open_time,
                SignalDetails::DeathCross {
                    ma: MaKind::Ema,
                    fast_period: self.fast_period,
                    slow_period: self.slow_period,
                    fast_value: f,
                    slow_value: s,
                },
            ));
        }

        // Zone touch against the fast EMA
        if let Some(event) = self.check_zone(series, price, f, latest.open_time) {
            events.push(event);
        }

        events
    }

    fn check_zone(
        &mut self,
        series: &CandleSeries,
        price: f64,
        ema_fast: f64,
        signal_time: i64,
    ) -> Option<SignalEvent> {
        let key = series.symbol.clone();

        // Re-arm once price has moved far enough from the last alert
        if let Some(zone) = self.zones.get_mut(&key) {
            if !zone.armed {
                let moved_pct =
                    (price - zone.last_alert_price).abs() / zone.last_alert_price * 100.0;
                if moved_pct >= self.rearm_pct {
                    zone.armed = true;
                    debug!(
                        "zone re-armed: {} moved {:.2}% from {:.4}",
                        key, moved_pct, zone.last_alert_price
                    );
                }
            }
        }

        let distance_pct = (price - ema_fast).abs() / ema_fast * 100.0;
        if distance_pct > self.zone_pct {
            return None;
        }

        let armed = self.zones.get(&key).map(|z| z.armed).unwrap_or(true);
        if !armed {
            self.zone_suppressed += 1;
            debug!(
                "zone touch suppressed (not re-armed): {} {}",
                key, series.timeframe
            );
            return None;
        }

        self.zones.insert(
            key,
            ZoneState {
                armed: false,
                last_alert_price: price,
            },
        );
        self.zone_signals += 1;
        info!(
            "ema zone touch: {} {} price={:.4} ema{}={:.4} dist={:.3}%",
            series.symbol, series.timeframe, price, self.fast_period, ema_fast, distance_pct
        );

        let details = if price >= ema_fast {
            SignalDetails::SupportProximity {
                ma: MaKind::Ema,
                period: self.fast_period,
                level: ema_fast,
                price,
                distance_pct,
            }
        } else {
            SignalDetails::ResistanceProximity {
                ma: MaKind::Ema,
                period: self.fast_period,
                level: ema_fast,
                price,
                distance_pct,
            }
        };
        Some(SignalEvent::new(
            series.symbol.clone(),
            series.timeframe,
            signal_time,
            details,
        ))
    }

    pub fn get_stats(&self) -> EmaCrossDetectorStats {
        EmaCrossDetectorStats {
            evaluations: self.evaluations,
            cross_signals: self.cross_signals,
            zone_signals: self.zone_signals,
            zone_suppressed: self.zone_suppressed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmaCrossDetectorStats {
    pub evaluations: u64,
    pub cross_signals: u64,
    pub zone_signals: u64,
    pub zone_suppressed: u64,
}

impl fmt::Display for EmaCrossDetectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EmaCross(evals={}, crosses={}, zones={}, zone_suppressed={})",
            self.evaluations, self.cross_signals, self.zone_signals, self.zone_suppressed
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
