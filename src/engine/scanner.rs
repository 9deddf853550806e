// Scan Engine - one cycle fans symbols out to bounded workers and funnels
// candidate signals back through the arbiter to the notifier

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::config::{get_config, ScannerConfig};
use crate::core::errors::StoreError;
use crate::core::types::{now_ms, CandleSeries, Timeframe};
use crate::detectors::{
    CipherDetector, CipherDetectorStats, EmaCrossDetector, EmaCrossDetectorStats,
    SmaCrossDetector, SmaCrossDetectorStats, SqueezeDetector, SqueezeDetectorStats,
};
use crate::engine::arbiter::{ArbiterStats, SignalArbiter, SymbolReport};
use crate::engine::providers::{AssetUniverse, CandleProvider, NotificationSender};
use crate::indicators::{bollinger, moving_average, wavetrend};

/// Candles fetched for the WaveTrend chain. Well past the oscillator's
/// minimum so the EMA warmup transient has decayed.
const CIPHER_CANDLES: usize = 100;

/// All four detectors behind one handle. Evaluation is synchronous and
/// short; workers lock only around the call.
struct DetectorSet {
    squeeze: Mutex<SqueezeDetector>,
    cipher: Mutex<CipherDetector>,
    ema: Mutex<EmaCrossDetector>,
    sma: Mutex<SmaCrossDetector>,
}

impl DetectorSet {
    fn from_config(config: &ScannerConfig) -> Self {
        Self {
            squeeze: Mutex::new(SqueezeDetector::new(
                config.bbw.tolerance,
                config.bbw.separation_threshold,
            )),
            cipher: Mutex::new(CipherDetector::new()),
            ema: Mutex::new(EmaCrossDetector::new(
                config.ema.fast_period,
                config.ema.slow_period,
                config.ema.zone_pct,
                config.ema.rearm_pct,
            )),
            sma: Mutex::new(SmaCrossDetector::new(
                config.sma.fast_period,
                config.sma.slow_period,
                config.sma.ranging_pct,
                config.sma.proximity_pct,
            )),
        }
    }
}

/// Orchestrates scan cycles: universe -> bounded parallel symbol scans ->
/// arbiter -> notifier. Symbol failures and timeouts stay isolated; a bad
/// symbol costs its own signals, never the cycle.
pub struct ScanEngine {
    config: Arc<ScannerConfig>,
    provider: Arc<dyn CandleProvider>,
    universe: Arc<dyn AssetUniverse>,
    notifier: Arc<dyn NotificationSender>,
    detectors: Arc<DetectorSet>,
    arbiter: Arc<tokio::sync::Mutex<SignalArbiter>>,
    cycles_run: AtomicU64,
}

impl ScanEngine {
    pub fn new(
        config: ScannerConfig,
        provider: Arc<dyn CandleProvider>,
        universe: Arc<dyn AssetUniverse>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Result<Self, StoreError> {
        let arbiter = SignalArbiter::new(&config)?;
        let detectors = DetectorSet::from_config(&config);
        Ok(Self {
            config: Arc::new(config),
            provider,
            universe,
            notifier,
            detectors: Arc::new(detectors),
            arbiter: Arc::new(tokio::sync::Mutex::new(arbiter)),
            cycles_run: AtomicU64::new(0),
        })
    }

    /// Build against the process-wide config.
    pub fn with_defaults(
        provider: Arc<dyn CandleProvider>,
        universe: Arc<dyn AssetUniverse>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Result<Self, StoreError> {
        Self::new(get_config().clone(), provider, universe, notifier)
    }

    /// Run one full scan cycle and deliver whatever it produced.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let cycle = self.cycles_run.fetch_add(1, Ordering::Relaxed) + 1;

        let symbols = match self.universe.symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                error!("cycle {}: universe unavailable: {}", cycle, e);
                return CycleReport::empty(started.elapsed());
            }
        };
        info!("cycle {}: scanning {} symbols", cycle, symbols.len());

        let (tx, mut rx) = mpsc::channel::<SymbolReport>(self.config.engine.channel_capacity);
        let semaphore = Arc::new(Semaphore::new(self.config.engine.max_concurrent_symbols));
        let per_symbol = Duration::from_secs(self.config.engine.symbol_timeout_secs);

        let mut handles = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let symbol = symbol.clone();
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let config = self.config.clone();
            let provider = self.provider.clone();
            let detectors = self.detectors.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let report = match timeout(
                    per_symbol,
                    scan_symbol(symbol.clone(), config, provider, detectors),
                )
                .await
                {
                    Ok(report) => report,
                    Err(_) => {
                        warn!("symbol {} timed out after {:?}", symbol, per_symbol);
                        SymbolReport::timed_out(symbol)
                    }
                };
                let _ = tx.send(report).await;
            }));
        }
        drop(tx);

        let now = now_ms();
        let mut alerts = Vec::new();
        let mut symbols_reported = 0usize;
        let mut symbols_timed_out = 0usize;
        let mut candidates = 0usize;
        {
            let mut arbiter = self.arbiter.lock().await;
            while let Some(report) = rx.recv().await {
                symbols_reported += 1;
                if report.timed_out {
                    symbols_timed_out += 1;
                }
                candidates += report.candidates.len();
                alerts.extend(arbiter.process_report(report, now));
            }
        }
        for handle in handles {
            if handle.await.is_err() {
                warn!("cycle {}: a symbol worker panicked", cycle);
            }
        }

        let alerts_sent = if alerts.is_empty() {
            0
        } else {
            match self.notifier.send(&alerts).await {
                Ok(()) => alerts.len(),
                Err(e) => {
                    error!("cycle {}: notification delivery failed: {}", cycle, e);
                    0
                }
            }
        };

        let cleaned_records = self.arbiter.lock().await.cleanup(now);

        let report = CycleReport {
            symbols_total: symbols.len(),
            symbols_reported,
            symbols_timed_out,
            candidates,
            alerts_sent,
            cleaned_records,
            elapsed: started.elapsed(),
        };
        info!("cycle {}: {}", cycle, report);
        report
    }

    pub async fn get_stats(&self) -> EngineStats {
        EngineStats {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            squeeze: self.detectors.squeeze.lock().get_stats(),
            cipher: self.detectors.cipher.lock().get_stats(),
            ema: self.detectors.ema.lock().get_stats(),
            sma: self.detectors.sma.lock().get_stats(),
            arbiter: self.arbiter.lock().await.get_stats(),
        }
    }
}

/// Fetch, validate, and run every configured detector for one symbol.
/// Each fetch failure is logged and counted; the rest of the scan goes on.
async fn scan_symbol(
    symbol: String,
    config: Arc<ScannerConfig>,
    provider: Arc<dyn CandleProvider>,
    detectors: Arc<DetectorSet>,
) -> SymbolReport {
    let mut report = SymbolReport::new(symbol.clone());

    let bbw_needed =
        bollinger::required_candles(config.bbw.length, config.bbw.contraction_length) + 10;
    for tf in &config.bbw.timeframes {
        let series = match fetch_series(&provider, &symbol, *tf, bbw_needed, &mut report).await {
            Some(series) => series,
            None => continue,
        };
        match bollinger::band_width(
            &series.closes(),
            config.bbw.length,
            config.bbw.multiplier,
            config.bbw.contraction_length,
        ) {
            Ok(bands) => {
                if let Some(event) = detectors.squeeze.lock().evaluate(&series, &bands) {
                    report.candidates.push(event);
                }
            }
            Err(e) => debug!("bbw skipped for {} {}: {}", symbol, tf, e),
        }
    }

    let short_tf = config.wavetrend.short_timeframe;
    if let Some(series) =
        fetch_series(&provider, &symbol, short_tf, CIPHER_CANDLES, &mut report).await
    {
        match wavetrend::wavetrend(&series.candles) {
            Ok(wt) => {
                if let Some(event) = detectors.cipher.lock().evaluate(&series, &wt) {
                    report.candidates.push(event);
                }
            }
            Err(e) => debug!("wavetrend skipped for {} {}: {}", symbol, short_tf, e),
        }
    }

    let long_tf = config.wavetrend.long_timeframe;
    if let Some(series) =
        fetch_series(&provider, &symbol, long_tf, CIPHER_CANDLES, &mut report).await
    {
        match wavetrend::wavetrend(&series.candles) {
            Ok(wt) => {
                // Long-timeframe readings only feed confirmation, they are
                // not alert candidates themselves
                if let Some(event) = detectors.cipher.lock().evaluate(&series, &wt) {
                    report.cipher_long = event.direction().map(|d| (d, event.signal_time));
                }
            }
            Err(e) => debug!("wavetrend skipped for {} {}: {}", symbol, long_tf, e),
        }
    }

    let ema_tf = config.ema.timeframe;
    let ema_needed = config.ema.slow_period + 100;
    if let Some(series) = fetch_series(&provider, &symbol, ema_tf, ema_needed, &mut report).await {
        let closes = series.closes();
        let fast = moving_average::ema_sma_seeded(&closes, config.ema.fast_period);
        let slow = moving_average::ema_sma_seeded(&closes, config.ema.slow_period);
        report
            .candidates
            .extend(detectors.ema.lock().evaluate(&series, &fast, &slow));
    }

    let sma_tf = config.sma.timeframe;
    let sma_needed = config.sma.slow_period + 50;
    if let Some(series) = fetch_series(&provider, &symbol, sma_tf, sma_needed, &mut report).await {
        let closes = series.closes();
        let fast = moving_average::sma(&closes, config.sma.fast_period);
        let slow = moving_average::sma(&closes, config.sma.slow_period);
        if let Some(event) = detectors.sma.lock().evaluate(&series, &fast, &slow) {
            report.candidates.push(event);
        }
    }

    report
}

async fn fetch_series(
    provider: &Arc<dyn CandleProvider>,
    symbol: &str,
    timeframe: Timeframe,
    min_candles: usize,
    report: &mut SymbolReport,
) -> Option<CandleSeries> {
    match provider.fetch(symbol, timeframe, min_candles).await {
        Ok(series) => match series.validate() {
            Ok(()) => Some(series),
            Err(e) => {
                warn!("invalid candles for {} {}: {}", symbol, timeframe, e);
                report.fetch_failures += 1;
                None
            }
        },
        Err(e) => {
            warn!("fetch failed for {} {}: {}", symbol, timeframe, e);
            report.fetch_failures += 1;
            None
        }
    }
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub symbols_total: usize,
    pub symbols_reported: usize,
    pub symbols_timed_out: usize,
    pub candidates: usize,
    pub alerts_sent: usize,
    pub cleaned_records: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn empty(elapsed: Duration) -> Self {
        Self {
            symbols_total: 0,
            symbols_reported: 0,
            symbols_timed_out: 0,
            candidates: 0,
            alerts_sent: 0,
            cleaned_records: 0,
            elapsed,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} symbols in {:?} ({} timed out), {} candidates -> {} alerts, {} records cleaned",
            self.symbols_reported,
            self.symbols_total,
            self.elapsed,
            self.symbols_timed_out,
            self.candidates,
            self.alerts_sent,
            self.cleaned_records
        )
    }
}

/// Counters from every layer of the engine, for periodic stats logging.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cycles_run: u64,
    pub squeeze: SqueezeDetectorStats,
    pub cipher: CipherDetectorStats,
    pub ema: EmaCrossDetectorStats,
    pub sma: SmaCrossDetectorStats,
    pub arbiter: ArbiterStats,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Engine(cycles={})", self.cycles_run)?;
        writeln!(f, "  {}", self.squeeze)?;
        writeln!(f, "  {}", self.cipher)?;
        writeln!(f, "  {}", self.ema)?;
        writeln!(f, "  {}", self.sma)?;
        write!(f, "  {}", self.arbiter)
    }
}

// ============================================================================
// TESTS
// ============================================================================
