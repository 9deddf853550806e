// Core Types - Candle series, timeframes, signal events and alerts
// Shared data contracts used by indicators, detectors, stores and the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::core::errors::AnalysisError;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ============================================================================
// TIMEFRAMES
// ============================================================================

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;

/// Candle timeframes the scanner evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Duration of one candle in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::M15 => 15 * MINUTE_MS,
            Timeframe::H1 => HOUR_MS,
            Timeframe::H2 => 2 * HOUR_MS,
            Timeframe::H4 => 4 * HOUR_MS,
            Timeframe::H8 => 8 * HOUR_MS,
            Timeframe::D1 => 24 * HOUR_MS,
        }
    }

    /// Floor a timestamp to this timeframe's dedup bucket resolution:
    /// minute resolution below one hour, hour resolution at one hour and up.
    pub fn bucket(&self, timestamp_ms: i64) -> i64 {
        let resolution = if self.duration_ms() < HOUR_MS {
            MINUTE_MS
        } else {
            HOUR_MS
        };
        timestamp_ms - timestamp_ms.rem_euclid(resolution)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H8 => "8h",
            Timeframe::D1 => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "8h" => Ok(Timeframe::H8),
            "1d" => Ok(Timeframe::D1),
            _ => Err(format!("unknown timeframe: {}", s)),
        }
    }
}

// ============================================================================
// CANDLES
// ============================================================================

/// A single OHLCV candle. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Typical price, the WaveTrend source.
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// A contiguous candle series for one symbol on one timeframe, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Most recent candle (possibly still forming).
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Last closed candle, one behind the latest.
    pub fn penultimate(&self) -> Option<&Candle> {
        if self.candles.len() < 2 {
            return None;
        }
        self.candles.get(self.candles.len() - 2)
    }

    /// Sanity-check the series before any math runs on it: finite positive
    /// closes, high >= low, strictly increasing open times.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (i, c) in self.candles.iter().enumerate() {
            if !c.close.is_finite() || c.close <= 0.0 {
                return Err(AnalysisError::InvalidCandle(format!(
                    "{} {}: non-positive close {} at index {}",
                    self.symbol, self.timeframe, c.close, i
                )));
            }
            if !c.high.is_finite() || !c.low.is_finite() || c.high < c.low {
                return Err(AnalysisError::InvalidCandle(format!(
                    "{} {}: high {} below low {} at index {}",
                    self.symbol, self.timeframe, c.high, c.low, i
                )));
            }
            if i > 0 && c.open_time <= self.candles[i - 1].open_time {
                return Err(AnalysisError::InvalidCandle(format!(
                    "{} {}: open_time not increasing at index {}",
                    self.symbol, self.timeframe, i
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SIGNAL EVENTS
// ============================================================================

/// Direction of an oscillator signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDirection::Buy => write!(f, "BUY"),
            SignalDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// Broad market regime derived from the SMA pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketTrend {
    Bullish,
    Bearish,
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which moving-average family produced a cross or level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaKind {
    Ema,
    Sma,
}

impl MaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaKind::Ema => "ema",
            MaKind::Sma => "sma",
        }
    }
}

/// The eight signal kinds the detectors can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Squeeze,
    GoldenCross,
    DeathCross,
    OversoldCross,
    OverboughtCross,
    SupportProximity,
    ResistanceProximity,
    Ranging,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Squeeze => "squeeze",
            SignalKind::GoldenCross => "golden_cross",
            SignalKind::DeathCross => "death_cross",
            SignalKind::OversoldCross => "oversold_cross",
            SignalKind::OverboughtCross => "overbought_cross",
            SignalKind::SupportProximity => "support_proximity",
            SignalKind::ResistanceProximity => "resistance_proximity",
            SignalKind::Ranging => "ranging",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific payload of a signal event. One variant per kind so each
/// alert carries only the magnitudes that explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalDetails {
    Squeeze {
        width: f64,
        contraction_floor: f64,
    },
    GoldenCross {
        ma: MaKind,
        fast_period: usize,
        slow_period: usize,
        fast_value: f64,
        slow_value: f64,
    },
    DeathCross {
        ma: MaKind,
        fast_period: usize,
        slow_period: usize,
        fast_value: f64,
        slow_value: f64,
    },
    OversoldCross {
        wt1: f64,
        wt2: f64,
    },
    OverboughtCross {
        wt1: f64,
        wt2: f64,
    },
    SupportProximity {
        ma: MaKind,
        period: usize,
        level: f64,
        price: f64,
        distance_pct: f64,
    },
    ResistanceProximity {
        ma: MaKind,
        period: usize,
        level: f64,
        price: f64,
        distance_pct: f64,
    },
    Ranging {
        gap_pct: f64,
        sma_fast: f64,
        sma_slow: f64,
    },
}

impl SignalDetails {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalDetails::Squeeze { .. } => SignalKind::Squeeze,
            SignalDetails::GoldenCross { .. } => SignalKind::GoldenCross,
            SignalDetails::DeathCross { .. } => SignalKind::DeathCross,
            SignalDetails::OversoldCross { .. } => SignalKind::OversoldCross,
            SignalDetails::OverboughtCross { .. } => SignalKind::OverboughtCross,
            SignalDetails::SupportProximity { .. } => SignalKind::SupportProximity,
            SignalDetails::ResistanceProximity { .. } => SignalKind::ResistanceProximity,
            SignalDetails::Ranging { .. } => SignalKind::Ranging,
        }
    }
}

/// A detected condition on one symbol/timeframe, before deduplication.
/// `signal_time` is the open time of the candle the condition was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_time: i64,
    pub details: SignalDetails,
}

impl SignalEvent {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        signal_time: i64,
        details: SignalDetails,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            signal_time,
            details,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.details.kind()
    }

    /// Dedup key token: the kind plus the qualifier that keeps distinct
    /// levels/systems from colliding (e.g. SMA50 vs SMA200 proximity).
    pub fn key_token(&self) -> String {
        match &self.details {
            SignalDetails::GoldenCross {
                ma,
                fast_period,
                slow_period,
                ..
            }
            | SignalDetails::DeathCross {
                ma,
                fast_period,
                slow_period,
                ..
            } => format!(
                "{}:{}_{}_{}",
                self.kind(),
                ma.as_str(),
                fast_period,
                slow_period
            ),
            SignalDetails::SupportProximity { ma, period, .. }
            | SignalDetails::ResistanceProximity { ma, period, .. } => {
                format!("{}:{}_{}", self.kind(), ma.as_str(), period)
            }
            _ => self.kind().to_string(),
        }
    }

    /// Signal direction for oscillator crossings; `None` for other kinds.
    pub fn direction(&self) -> Option<SignalDirection> {
        match self.details {
            SignalDetails::OversoldCross { .. } => Some(SignalDirection::Buy),
            SignalDetails::OverboughtCross { .. } => Some(SignalDirection::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            SignalDetails::Squeeze {
                width,
                contraction_floor,
            } => write!(
                f,
                "{} {} SQUEEZE width={:.4} floor={:.4}",
                self.symbol, self.timeframe, width, contraction_floor
            ),
            SignalDetails::GoldenCross {
                ma,
                fast_period,
                slow_period,
                fast_value,
                slow_value,
            } => write!(
                f,
                "{} {} GOLDEN CROSS {}{}/{}{} ({:.4} > {:.4})",
                self.symbol,
                self.timeframe,
                ma.as_str(),
                fast_period,
                ma.as_str(),
                slow_period,
                fast_value,
                slow_value
            ),
            SignalDetails::DeathCross {
                ma,
                fast_period,
                slow_period,
                fast_value,
                slow_value,
            } => write!(
                f,
                "{} {} DEATH CROSS {}{}/{}{} ({:.4} < {:.4})",
                self.symbol,
                self.timeframe,
                ma.as_str(),
                fast_period,
                ma.as_str(),
                slow_period,
                fast_value,
                slow_value
            ),
            SignalDetails::OversoldCross { wt1, wt2 } => write!(
                f,
                "{} {} BUY wt1={:.2} wt2={:.2}",
                self.symbol, self.timeframe, wt1, wt2
            ),
            SignalDetails::OverboughtCross { wt1, wt2 } => write!(
                f,
                "{} {} SELL wt1={:.2} wt2={:.2}",
                self.symbol, self.timeframe, wt1, wt2
            ),
            SignalDetails::SupportProximity {
                ma,
                period,
                level,
                price,
                distance_pct,
            } => write!(
                f,
                "{} {} SUPPORT {}{} level={:.4} price={:.4} dist={:.2}%",
                self.symbol, self.timeframe, ma.as_str(), period, level, price, distance_pct
            ),
            SignalDetails::ResistanceProximity {
                ma,
                period,
                level,
                price,
                distance_pct,
            } => write!(
                f,
                "{} {} RESISTANCE {}{} level={:.4} price={:.4} dist={:.2}%",
                self.symbol, self.timeframe, ma.as_str(), period, level, price, distance_pct
            ),
            SignalDetails::Ranging {
                gap_pct,
                sma_fast,
                sma_slow,
            } => write!(
                f,
                "{} {} RANGING gap={:.2}% fast={:.4} slow={:.4}",
                self.symbol, self.timeframe, gap_pct, sma_fast, sma_slow
            ),
        }
    }
}

// ============================================================================
// ALERTS
// ============================================================================

/// Escalation tier attached to an accepted event. CipherB signals climb
/// Primary -> Repeated -> Confirmed; everything else is Standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertTier {
    Standard,
    Primary,
    Repeated,
    Confirmed,
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertTier::Standard => "STANDARD",
            AlertTier::Primary => "PRIMARY",
            AlertTier::Repeated => "REPEATED",
            AlertTier::Confirmed => "CONFIRMED",
        };
        write!(f, "{}", s)
    }
}

/// An accepted, ready-to-deliver alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub tier: AlertTier,
    pub created_at: i64,
    pub event: SignalEvent,
}

impl Alert {
    pub fn new(event: SignalEvent, tier: AlertTier, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tier,
            created_at,
            event,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tier, self.event)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60_000, c, c * 1.01, c * 0.99, c, 100.0))
            .collect()
    }

    #[test]
    fn test_timeframe_roundtrip() {
        for tf in [
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H2,
            Timeframe::H4,
            Timeframe::H8,
            Timeframe::D1,
        ] {
            let parsed: Timeframe = tf.to_string().parse().unwrap();
            assert_eq!(parsed, tf);
        }
        assert!("3w".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_bucket_resolution() {
        // 15m buckets floor to the minute, 1h+ buckets floor to the hour
        let ts = 3_600_000 + 125_000; // 1h + 2m5s
        assert_eq!(Timeframe::M15.bucket(ts), 3_600_000 + 120_000);
        assert_eq!(Timeframe::H1.bucket(ts), 3_600_000);
        assert_eq!(Timeframe::D1.bucket(ts), 3_600_000);
    }

    #[test]
    fn test_series_validate_ok() {
        let series = CandleSeries::new("BTCUSDT", Timeframe::H1, make_candles(&[10.0, 11.0, 12.0]));
        assert!(series.validate().is_ok());
        assert_eq!(series.latest().unwrap().close, 12.0);
        assert_eq!(series.penultimate().unwrap().close, 11.0);
    }

    #[test]
    fn test_series_validate_rejects_bad_close() {
        let mut candles = make_candles(&[10.0, 11.0]);
        candles[1].close = -1.0;
        let series = CandleSeries::new("BTCUSDT", Timeframe::H1, candles);
        assert!(matches!(
            series.validate(),
            Err(AnalysisError::InvalidCandle(_))
        ));
    }

    #[test]
    fn test_series_validate_rejects_unordered_times() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0]);
        candles[2].open_time = candles[1].open_time;
        let series = CandleSeries::new("BTCUSDT", Timeframe::H1, candles);
        assert!(series.validate().is_err());
    }

    #[test]
    fn test_key_token_distinguishes_levels() {
        let support_fast = SignalEvent::new(
            "BTCUSDT",
            Timeframe::D1,
            0,
            SignalDetails::SupportProximity {
                ma: MaKind::Sma,
                period: 50,
                level: 100.0,
                price: 101.0,
                distance_pct: 1.0,
            },
        );
        let support_slow = SignalEvent::new(
            "BTCUSDT",
            Timeframe::D1,
            0,
            SignalDetails::SupportProximity {
                ma: MaKind::Sma,
                period: 200,
                level: 95.0,
                price: 96.0,
                distance_pct: 1.0,
            },
        );
        assert_eq!(support_fast.key_token(), "support_proximity:sma_50");
        assert_eq!(support_slow.key_token(), "support_proximity:sma_200");
        assert_ne!(support_fast.key_token(), support_slow.key_token());
    }

    #[test]
    fn test_event_direction() {
        let buy = SignalEvent::new(
            "ETHUSDT",
            Timeframe::H2,
            0,
            SignalDetails::OversoldCross {
                wt1: -72.0,
                wt2: -75.0,
            },
        );
        assert_eq!(buy.direction(), Some(SignalDirection::Buy));
        assert_eq!(buy.kind(), SignalKind::OversoldCross);

        let squeeze = SignalEvent::new(
            "ETHUSDT",
            Timeframe::M15,
            0,
            SignalDetails::Squeeze {
                width: 1.0,
                contraction_floor: 1.0,
            },
        );
        assert_eq!(squeeze.direction(), None);
    }

    #[test]
    fn test_alert_display() {
        let event = SignalEvent::new(
            "BTCUSDT",
            Timeframe::H2,
            0,
            SignalDetails::OversoldCross {
                wt1: -72.1,
                wt2: -75.0,
            },
        );
        let alert = Alert::new(event, AlertTier::Primary, 1_000);
        let text = alert.to_string();
        assert!(text.starts_with("[PRIMARY] BTCUSDT 2h BUY"));
        assert!(!alert.id.is_empty());
    }
}
