// Signal Arbiter - sole owner of dedup stores and escalation state
// Workers detect in parallel; acceptance decisions are serialized here

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::config::ScannerConfig;
use crate::core::errors::StoreError;
use crate::core::types::{
    Alert, AlertTier, MaKind, SignalDetails, SignalDirection, SignalEvent, SignalKind, Timeframe,
};
use crate::state::dedup::DedupStore;
use crate::state::escalation::{EscalationCoordinator, EscalationOutcome};
use crate::state::store::{JsonFileStore, MemoryStore, SharedStore};

const HOUR_MS: i64 = 3_600_000;
const RETENTION_MIN_MS: i64 = 2 * HOUR_MS;
const RETENTION_MAX_MS: i64 = 48 * HOUR_MS;

/// Everything one worker found for one symbol in one cycle.
#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub candidates: Vec<SignalEvent>,
    /// This cycle's long-timeframe CipherB reading, for confirmation.
    pub cipher_long: Option<(SignalDirection, i64)>,
    pub fetch_failures: u32,
    pub timed_out: bool,
}

impl SymbolReport {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            candidates: Vec::new(),
            cipher_long: None,
            fetch_failures: 0,
            timed_out: false,
        }
    }

    pub fn timed_out(symbol: impl Into<String>) -> Self {
        let mut report = Self::new(symbol);
        report.timed_out = true;
        report
    }
}

/// Routes candidate events through the dedup stores and, for short-timeframe
/// CipherB signals, the escalation coordinator. One store per signal family
/// and timeframe, so freshness windows and cooldowns stay per-family.
pub struct SignalArbiter {
    stores: HashMap<String, DedupStore>,
    escalation: EscalationCoordinator,

    events_processed: u64,
    alerts_emitted: u64,
    symbols_timed_out: u64,
    fetch_failures: u64,
}

impl SignalArbiter {
    pub fn new(config: &ScannerConfig) -> Result<Self, StoreError> {
        let mut stores = HashMap::new();

        for tf in &config.bbw.timeframes {
            let name = format!("squeeze_{}", tf);
            let store = open_store(config, &name)?;
            let freshness = freshness_ms(config, *tf);
            stores.insert(
                name.clone(),
                DedupStore::new(name, store, freshness, retention_ms(freshness, None), None),
            );
        }

        let short_tf = config.wavetrend.short_timeframe;
        let cipher_name = format!("cipher_{}", short_tf);
        let cipher_store = open_store(config, &cipher_name)?;
        let cipher_freshness = freshness_ms(config, short_tf);
        stores.insert(
            cipher_name.clone(),
            DedupStore::new(
                cipher_name,
                cipher_store,
                cipher_freshness,
                retention_ms(cipher_freshness, None),
                None,
            ),
        );

        let ema_tf = config.ema.timeframe;
        let ema_cooldown = config.ema.cross_cooldown_hours * HOUR_MS;
        let ema_freshness = freshness_ms(config, ema_tf);
        let cross_name = format!("ema_cross_{}", ema_tf);
        stores.insert(
            cross_name.clone(),
            DedupStore::new(
                cross_name.clone(),
                open_store(config, &cross_name)?,
                ema_freshness,
                retention_ms(ema_freshness, Some(ema_cooldown)),
                Some(ema_cooldown),
            ),
        );
        let zone_name = format!("ema_zone_{}", ema_tf);
        stores.insert(
            zone_name.clone(),
            DedupStore::new(
                zone_name.clone(),
                open_store(config, &zone_name)?,
                ema_freshness,
                retention_ms(ema_freshness, None),
                None,
            ),
        );

        let sma_tf = config.sma.timeframe;
        let sma_freshness = freshness_ms(config, sma_tf);
        let trend_name = format!("sma_cross_{}", sma_tf);
        stores.insert(
            trend_name.clone(),
            DedupStore::new(
                trend_name.clone(),
                open_store(config, &trend_name)?,
                sma_freshness,
                retention_ms(sma_freshness, None),
                None,
            ),
        );
        let proximity_cooldown = config.sma.proximity_cooldown_hours * HOUR_MS;
        let proximity_name = format!("sma_proximity_{}", sma_tf);
        stores.insert(
            proximity_name.clone(),
            DedupStore::new(
                proximity_name.clone(),
                open_store(config, &proximity_name)?,
                sma_freshness,
                retention_ms(sma_freshness, Some(proximity_cooldown)),
                Some(proximity_cooldown),
            ),
        );

        let escalation_name = format!(
            "escalation_{}_{}",
            config.wavetrend.short_timeframe, config.wavetrend.long_timeframe
        );
        let escalation = EscalationCoordinator::new(
            open_store(config, &escalation_name)?,
            config.wavetrend.short_timeframe,
            config.wavetrend.long_timeframe,
        );

        Ok(Self {
            stores,
            escalation,
            events_processed: 0,
            alerts_emitted: 0,
            symbols_timed_out: 0,
            fetch_failures: 0,
        })
    }

    /// Turn one worker's report into zero or more alerts. Dedup first; for
    /// short-timeframe CipherB events the escalation outcome then decides
    /// the tier, with a pending outcome producing no alert at all.
    pub fn process_report(&mut self, report: SymbolReport, now_ms: i64) -> Vec<Alert> {
        if report.timed_out {
            self.symbols_timed_out += 1;
        }
        self.fetch_failures += report.fetch_failures as u64;

        let mut alerts = Vec::new();
        for event in report.candidates {
            self.events_processed += 1;

            let name = route(&event);
            let store = match self.stores.get_mut(&name) {
                Some(store) => store,
                None => {
                    warn!("no dedup store '{}' for event {}", name, event);
                    continue;
                }
            };
            let decision = store.accept(&event, now_ms);
            if !decision.is_accepted() {
                debug!("suppressed {}: {:?}", event, decision);
                continue;
            }

            let tier = match self.escalation_tier(&event, report.cipher_long) {
                Some(tier) => tier,
                None => continue,
            };
            self.alerts_emitted += 1;
            alerts.push(Alert::new(event, tier, now_ms));
        }
        alerts
    }

    /// Standard for everything except short-timeframe CipherB events, which
    /// run through the escalation state machine. None means hold the alert.
    fn escalation_tier(
        &mut self,
        event: &SignalEvent,
        cipher_long: Option<(SignalDirection, i64)>,
    ) -> Option<AlertTier> {
        let is_cipher = matches!(
            event.kind(),
            SignalKind::OversoldCross | SignalKind::OverboughtCross
        );
        if !is_cipher || event.timeframe != self.escalation.short_timeframe() {
            return Some(AlertTier::Standard);
        }
        let direction = event.direction()?;
        let outcome =
            self.escalation
                .process(&event.symbol, direction, event.signal_time, cipher_long);
        match outcome {
            EscalationOutcome::Primary => Some(AlertTier::Primary),
            EscalationOutcome::Repeated => Some(AlertTier::Repeated),
            EscalationOutcome::Confirmed => Some(AlertTier::Confirmed),
            EscalationOutcome::Pending => None,
        }
    }

    /// Drop expired dedup records across every store.
    pub fn cleanup(&mut self, now_ms: i64) -> usize {
        self.stores
            .values_mut()
            .map(|store| store.cleanup(now_ms))
            .sum()
    }

    pub fn get_stats(&self) -> ArbiterStats {
        let mut stores: Vec<_> = self.stores.values().map(|s| s.get_stats()).collect();
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        ArbiterStats {
            stores,
            escalation: self.escalation.get_stats(),
            events_processed: self.events_processed,
            alerts_emitted: self.alerts_emitted,
            symbols_timed_out: self.symbols_timed_out,
            fetch_failures: self.fetch_failures,
        }
    }
}

/// Dedup store that owns events of this shape.
fn route(event: &SignalEvent) -> String {
    let tf = event.timeframe;
    match &event.details {
        SignalDetails::Squeeze { .. } => format!("squeeze_{}", tf),
        SignalDetails::OversoldCross { .. } | SignalDetails::OverboughtCross { .. } => {
            format!("cipher_{}", tf)
        }
        SignalDetails::GoldenCross { ma, .. } | SignalDetails::DeathCross { ma, .. } => match ma {
            MaKind::Ema => format!("ema_cross_{}", tf),
            MaKind::Sma => format!("sma_cross_{}", tf),
        },
        SignalDetails::SupportProximity { ma, .. }
        | SignalDetails::ResistanceProximity { ma, .. } => match ma {
            MaKind::Ema => format!("ema_zone_{}", tf),
            MaKind::Sma => format!("sma_proximity_{}", tf),
        },
        SignalDetails::Ranging { .. } => format!("sma_cross_{}", tf),
    }
}

fn open_store(config: &ScannerConfig, name: &str) -> Result<SharedStore, StoreError> {
    if config.dedup.persist {
        let path = Path::new(&config.dedup.state_dir).join(format!("{}.json", name));
        Ok(Arc::new(JsonFileStore::open(name, path)?))
    } else {
        Ok(Arc::new(MemoryStore::new(name)))
    }
}

fn freshness_ms(config: &ScannerConfig, timeframe: Timeframe) -> i64 {
    (timeframe.duration_ms() as f64 * config.dedup.freshness_multiplier).round() as i64
}

/// Records outlive their freshness window by a margin so cooldown scans
/// still see them, bounded to keep store files small.
fn retention_ms(freshness_ms: i64, cooldown_ms: Option<i64>) -> i64 {
    (freshness_ms * 4)
        .max(cooldown_ms.unwrap_or(0))
        .clamp(RETENTION_MIN_MS, RETENTION_MAX_MS)
}

#[derive(Debug, Clone)]
pub struct ArbiterStats {
    pub stores: Vec<crate::state::dedup::DedupStoreStats>,
    pub escalation: crate::state::escalation::EscalationStats,
    pub events_processed: u64,
    pub alerts_emitted: u64,
    pub symbols_timed_out: u64,
    pub fetch_failures: u64,
}

impl fmt::Display for ArbiterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Arbiter(events={}, alerts={}, timeouts={}, fetch_failures={})",
            self.events_processed, self.alerts_emitted, self.symbols_timed_out, self.fetch_failures
        )?;
        for store in &self.stores {
            writeln!(f, "  {}", store)?;
        }
        write!(f, "  {}", self.escalation)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn memory_config() -> ScannerConfig {
        let mut config = ScannerConfig::default();
        config.dedup.persist = false;
        config
    }

    fn squeeze_event(symbol: &str, signal_time: i64) -> SignalEvent {
        SignalEvent::new(
            symbol,
            Timeframe::H1,
            signal_time,
            SignalDetails::Squeeze {
                width: 1.0,
                contraction_floor: 0.97,
            },
        )
    }

    fn cipher_event(symbol: &str, signal_time: i64, direction: SignalDirection) -> SignalEvent {
        let details = match direction {
            SignalDirection::Buy => SignalDetails::OversoldCross {
                wt1: -72.0,
                wt2: -75.0,
            },
            SignalDirection::Sell => SignalDetails::OverboughtCross {
                wt1: 72.0,
                wt2: 75.0,
            },
        };
        SignalEvent::new(symbol, Timeframe::H2, signal_time, details)
    }

    fn report_with(event: SignalEvent) -> SymbolReport {
        let mut report = SymbolReport::new(event.symbol.clone());
        report.candidates.push(event);
        report
    }

    #[test]
    fn test_standard_alert_once_per_bucket() {
        let mut arbiter = SignalArbiter::new(&memory_config()).unwrap();
        let now = 10 * HOUR;

        let first = arbiter.process_report(report_with(squeeze_event("BTCUSDT", now)), now);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tier, AlertTier::Standard);

        let again = arbiter.process_report(report_with(squeeze_event("BTCUSDT", now)), now + 60_000);
        assert!(again.is_empty());
    }

    #[test]
    fn test_cipher_tiers_follow_escalation() {
        let mut arbiter = SignalArbiter::new(&memory_config()).unwrap();

        let first = arbiter.process_report(
            report_with(cipher_event("BTCUSDT", 2 * HOUR, SignalDirection::Buy)),
            2 * HOUR,
        );
        assert_eq!(first[0].tier, AlertTier::Primary);

        let second = arbiter.process_report(
            report_with(cipher_event("BTCUSDT", 4 * HOUR, SignalDirection::Buy)),
            4 * HOUR,
        );
        assert_eq!(second[0].tier, AlertTier::Repeated);

        // Third repeat without a long-timeframe signal stays silent
        let third = arbiter.process_report(
            report_with(cipher_event("BTCUSDT", 6 * HOUR, SignalDirection::Buy)),
            6 * HOUR,
        );
        assert!(third.is_empty());

        // Fourth repeat with a matching long-timeframe signal confirms
        let mut report = report_with(cipher_event("BTCUSDT", 8 * HOUR, SignalDirection::Buy));
        report.cipher_long = Some((SignalDirection::Buy, 0));
        let fourth = arbiter.process_report(report, 8 * HOUR);
        assert_eq!(fourth[0].tier, AlertTier::Confirmed);
    }

    #[test]
    fn test_duplicate_cipher_bucket_does_not_advance_escalation() {
        let mut arbiter = SignalArbiter::new(&memory_config()).unwrap();
        let event = cipher_event("BTCUSDT", 2 * HOUR, SignalDirection::Buy);

        let first = arbiter.process_report(report_with(event.clone()), 2 * HOUR);
        assert_eq!(first[0].tier, AlertTier::Primary);

        // Same bucket again: dedup halts it before the state machine
        let again = arbiter.process_report(report_with(event), 2 * HOUR + 60_000);
        assert!(again.is_empty());
        assert_eq!(arbiter.get_stats().escalation.primaries, 1);
        assert_eq!(arbiter.get_stats().escalation.repeats, 0);
    }

    #[test]
    fn test_unconfigured_timeframe_is_dropped() {
        let mut arbiter = SignalArbiter::new(&memory_config()).unwrap();
        let event = SignalEvent::new(
            "BTCUSDT",
            Timeframe::H4,
            10 * HOUR,
            SignalDetails::Squeeze {
                width: 1.0,
                contraction_floor: 0.97,
            },
        );
        let alerts = arbiter.process_report(report_with(event), 10 * HOUR);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_retention_window_bounds() {
        // 15m freshness at x2 is 30m; retention clamps up to the floor
        assert_eq!(retention_ms(30 * 60_000, None), RETENTION_MIN_MS);
        // Cooldowns extend retention so their history survives cleanup
        assert_eq!(retention_ms(2 * HOUR, Some(48 * HOUR)), RETENTION_MAX_MS);
        // Daily stores clamp down to the cap
        assert_eq!(retention_ms(96 * HOUR, None), RETENTION_MAX_MS);
    }
}
