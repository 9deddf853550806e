// Escalation Coordinator - per-symbol direction history for CipherB signals
// Short-timeframe repeats arm a long-timeframe confirmation check

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::types::{SignalDirection, Timeframe};
use crate::state::store::SharedStore;

/// Persisted per-symbol history. Created on the first signal, reset in
/// place on a direction reversal, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationState {
    pub last_direction: Option<SignalDirection>,
    pub consecutive_count: u32,
    pub monitoring_long_timeframe: bool,
    pub monitoring_direction: Option<SignalDirection>,
    pub last_short_tf_time: i64,
    #[serde(default)]
    pub last_long_tf_time: Option<i64>,
}

impl EscalationState {
    fn first(direction: SignalDirection, signal_time: i64) -> Self {
        Self {
            last_direction: Some(direction),
            consecutive_count: 1,
            monitoring_long_timeframe: false,
            monitoring_direction: None,
            last_short_tf_time: signal_time,
            last_long_tf_time: None,
        }
    }
}

/// What a short-timeframe signal escalated to this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// First signal in this direction.
    Primary,
    /// Second consecutive signal; long-timeframe monitoring armed.
    Repeated,
    /// Third or later signal with a matching long-timeframe signal.
    Confirmed,
    /// Third or later signal, still waiting on the long timeframe.
    Pending,
}

impl EscalationOutcome {
    /// Pending produces no alert; everything else does.
    pub fn alerts(&self) -> bool {
        !matches!(self, EscalationOutcome::Pending)
    }
}

impl fmt::Display for EscalationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscalationOutcome::Primary => "primary",
            EscalationOutcome::Repeated => "repeated",
            EscalationOutcome::Confirmed => "confirmed",
            EscalationOutcome::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// Drives the per-symbol state machine. A repeated short-timeframe direction
/// stops alerting on its own and instead waits for the long timeframe to
/// agree. Monitoring stays armed after a confirmation, so a direction that
/// keeps repeating keeps reconfirming; only a reversal resets it.
pub struct EscalationCoordinator {
    store: SharedStore,
    short_timeframe: Timeframe,
    long_timeframe: Timeframe,

    primaries: u64,
    repeats: u64,
    confirmations: u64,
    pending: u64,
}

impl EscalationCoordinator {
    pub fn new(store: SharedStore, short_timeframe: Timeframe, long_timeframe: Timeframe) -> Self {
        Self {
            store,
            short_timeframe,
            long_timeframe,
            primaries: 0,
            repeats: 0,
            confirmations: 0,
            pending: 0,
        }
    }

    pub fn short_timeframe(&self) -> Timeframe {
        self.short_timeframe
    }

    pub fn long_timeframe(&self) -> Timeframe {
        self.long_timeframe
    }

    /// Advance the state machine for one short-timeframe signal.
    /// `long_signal` is this cycle's long-timeframe CipherB detection for
    /// the same symbol, when one exists.
    pub fn process(
        &mut self,
        symbol: &str,
        direction: SignalDirection,
        short_signal_time: i64,
        long_signal: Option<(SignalDirection, i64)>,
    ) -> EscalationOutcome {
        let mut state = match self.load(symbol) {
            Some(state) if state.last_direction == Some(direction) => state,
            Some(prev) => {
                // Direction reversal resets the record in place
                info!(
                    "escalation {}: reversal {} -> {} (had {} consecutive)",
                    symbol,
                    prev.last_direction.map(|d| d.to_string()).unwrap_or_else(|| "NONE".into()),
                    direction,
                    prev.consecutive_count
                );
                let state = EscalationState::first(direction, short_signal_time);
                self.save(symbol, &state);
                self.primaries += 1;
                return EscalationOutcome::Primary;
            }
            None => {
                let state = EscalationState::first(direction, short_signal_time);
                self.save(symbol, &state);
                self.primaries += 1;
                info!("escalation {}: primary {} on {}", symbol, direction, self.short_timeframe);
                return EscalationOutcome::Primary;
            }
        };

        state.last_short_tf_time = short_signal_time;

        if state.consecutive_count == 1 {
            state.consecutive_count = 2;
            state.monitoring_long_timeframe = true;
            state.monitoring_direction = Some(direction);
            self.save(symbol, &state);
            self.repeats += 1;
            info!(
                "escalation {}: repeated {} on {}, now monitoring {}",
                symbol, direction, self.short_timeframe, self.long_timeframe
            );
            return EscalationOutcome::Repeated;
        }

        state.consecutive_count += 1;
        let outcome = match long_signal {
            Some((long_dir, long_time)) if Some(long_dir) == state.monitoring_direction => {
                state.last_long_tf_time = Some(long_time);
                self.confirmations += 1;
                info!(
                    "escalation {}: {} confirmed by {} (streak {})",
                    symbol, direction, self.long_timeframe, state.consecutive_count
                );
                EscalationOutcome::Confirmed
            }
            _ => {
                self.pending += 1;
                debug!(
                    "escalation {}: {} streak {} awaiting {}",
                    symbol, direction, state.consecutive_count, self.long_timeframe
                );
                EscalationOutcome::Pending
            }
        };
        self.save(symbol, &state);
        outcome
    }

    /// A missing or unreadable record means no prior history.
    fn load(&self, symbol: &str) -> Option<EscalationState> {
        let value = self.store.get(symbol)?;
        match serde_json::from_value(value) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(
                    "escalation: unreadable state for {} ({}), treating as new",
                    symbol, e
                );
                None
            }
        }
    }

    fn save(&self, symbol: &str, state: &EscalationState) {
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(e) => {
                warn!("escalation: could not serialize state for {} ({})", symbol, e);
                return;
            }
        };
        if let Err(e) = self.store.put(symbol, value) {
            warn!("escalation: could not persist state for {} ({})", symbol, e);
        }
    }

    pub fn get_stats(&self) -> EscalationStats {
        EscalationStats {
            tracked_symbols: self.store.len(),
            primaries: self.primaries,
            repeats: self.repeats,
            confirmations: self.confirmations,
            pending: self.pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationStats {
    pub tracked_symbols: usize,
    pub primaries: u64,
    pub repeats: u64,
    pub confirmations: u64,
    pub pending: u64,
}

impl fmt::Display for EscalationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Escalation(symbols={}, primary={}, repeated={}, confirmed={}, pending={})",
            self.tracked_symbols, self.primaries, self.repeats, self.confirmations, self.pending
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
