// Configuration - Scanner settings with file load, env overrides and validation
// All sections have working defaults; a missing config file is not an error

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::types::Timeframe;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Configuration Sections
// ============================================================================

/// Logging setup passed to `setup_logging` at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
        }
    }
}

/// Bollinger Band Width squeeze detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BbwConfig {
    pub length: usize,
    pub multiplier: f64,
    pub contraction_length: usize,
    /// Absolute tolerance in BBW points for the squeeze touch test.
    pub tolerance: f64,
    /// Minimum distance (BBW points) between contraction floors of two
    /// consecutive emitted signals for the same symbol/timeframe.
    pub separation_threshold: f64,
    pub timeframes: Vec<Timeframe>,
}

impl Default for BbwConfig {
    fn default() -> Self {
        Self {
            length: 20,
            multiplier: 2.0,
            contraction_length: 125,
            tolerance: 0.05,
            separation_threshold: 0.10,
            timeframes: vec![Timeframe::M15, Timeframe::H1],
        }
    }
}

/// CipherB timeframe pairing. The oscillator constants themselves are
/// fixed in the indicator module and deliberately not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveTrendConfig {
    pub short_timeframe: Timeframe,
    pub long_timeframe: Timeframe,
}

impl Default for WaveTrendConfig {
    fn default() -> Self {
        Self {
            short_timeframe: Timeframe::H2,
            long_timeframe: Timeframe::H8,
        }
    }
}

/// EMA crossover and zone-touch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Zone-touch distance to the fast EMA, percent of the EMA value.
    pub zone_pct: f64,
    /// Price move (percent of last alerted price) required to re-arm the
    /// zone-touch after a fire.
    pub rearm_pct: f64,
    /// Per-symbol cooldown for crossover alerts, hours.
    pub cross_cooldown_hours: i64,
    pub timeframe: Timeframe,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            fast_period: 21,
            slow_period: 50,
            zone_pct: 0.5,
            rearm_pct: 5.0,
            cross_cooldown_hours: 48,
            timeframe: Timeframe::H1,
        }
    }
}

/// SMA trend, ranging and level-proximity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmaConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// SMA gap (percent of their average) at or below which the market
    /// counts as ranging.
    pub ranging_pct: f64,
    /// Price distance to a SMA level (percent) that counts as proximity.
    pub proximity_pct: f64,
    /// Per-(symbol, level) suppression window for proximity alerts, hours.
    pub proximity_cooldown_hours: i64,
    pub timeframe: Timeframe,
}

impl Default for SmaConfig {
    fn default() -> Self {
        Self {
            fast_period: 50,
            slow_period: 200,
            ranging_pct: 0.5,
            proximity_pct: 2.0,
            proximity_cooldown_hours: 12,
            timeframe: Timeframe::D1,
        }
    }
}

/// Dedup store placement and freshness tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Directory for the JSON store files when `persist` is set.
    pub state_dir: String,
    pub persist: bool,
    /// Freshness window per store = timeframe duration * this multiplier.
    pub freshness_multiplier: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            state_dir: "state".to_string(),
            persist: true,
            freshness_multiplier: 2.0,
        }
    }
}

/// Scan cycle concurrency limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_symbols: usize,
    pub symbol_timeout_secs: u64,
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_symbols: 10,
            symbol_timeout_secs: 30,
            channel_capacity: 256,
        }
    }
}

// ============================================================================
// Aggregate Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScannerConfig {
    pub logging: LoggingConfig,
    pub bbw: BbwConfig,
    pub wavetrend: WaveTrendConfig,
    pub ema: EmaConfig,
    pub sma: SmaConfig,
    pub dedup: DedupConfig,
    pub engine: EngineConfig,
}

impl ScannerConfig {
    /// Load from a JSON file. A missing file yields defaults with a warning.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        info!("saved config to {}", path.as_ref().display());
        Ok(())
    }

    /// Apply SENTRY_* environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SENTRY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(dir) = std::env::var("SENTRY_STATE_DIR") {
            self.dedup.state_dir = dir;
        }
        if let Ok(val) = std::env::var("SENTRY_PERSIST") {
            self.dedup.persist = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("SENTRY_MAX_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(n) => self.engine.max_concurrent_symbols = n,
                Err(_) => warn!("ignoring invalid SENTRY_MAX_CONCURRENCY: {}", val),
            }
        }
        if let Ok(val) = std::env::var("SENTRY_SYMBOL_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) => self.engine.symbol_timeout_secs = n,
                Err(_) => warn!("ignoring invalid SENTRY_SYMBOL_TIMEOUT_SECS: {}", val),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bbw.length < 2 {
            return Err(ConfigError::Validation("bbw.length must be >= 2".into()));
        }
        if self.bbw.multiplier <= 0.0 {
            return Err(ConfigError::Validation("bbw.multiplier must be > 0".into()));
        }
        if self.bbw.contraction_length < 2 {
            return Err(ConfigError::Validation(
                "bbw.contraction_length must be >= 2".into(),
            ));
        }
        if self.bbw.tolerance < 0.0 || self.bbw.separation_threshold < 0.0 {
            return Err(ConfigError::Validation(
                "bbw tolerance and separation_threshold must be >= 0".into(),
            ));
        }
        if self.bbw.timeframes.is_empty() {
            return Err(ConfigError::Validation(
                "bbw.timeframes must not be empty".into(),
            ));
        }
        if self.wavetrend.short_timeframe.duration_ms() >= self.wavetrend.long_timeframe.duration_ms()
        {
            return Err(ConfigError::Validation(
                "wavetrend.short_timeframe must be shorter than long_timeframe".into(),
            ));
        }
        if self.ema.fast_period == 0 || self.ema.fast_period >= self.ema.slow_period {
            return Err(ConfigError::Validation(
                "ema periods must satisfy 0 < fast < slow".into(),
            ));
        }
        if self.ema.zone_pct <= 0.0 || self.ema.rearm_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "ema zone_pct and rearm_pct must be > 0".into(),
            ));
        }
        if !(1..=48).contains(&self.ema.cross_cooldown_hours) {
            return Err(ConfigError::Validation(
                "ema.cross_cooldown_hours must be within 1..=48".into(),
            ));
        }
        if self.sma.fast_period == 0 || self.sma.fast_period >= self.sma.slow_period {
            return Err(ConfigError::Validation(
                "sma periods must satisfy 0 < fast < slow".into(),
            ));
        }
        if self.sma.ranging_pct <= 0.0 || self.sma.proximity_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "sma ranging_pct and proximity_pct must be > 0".into(),
            ));
        }
        if !(1..=48).contains(&self.sma.proximity_cooldown_hours) {
            return Err(ConfigError::Validation(
                "sma.proximity_cooldown_hours must be within 1..=48".into(),
            ));
        }
        if self.dedup.freshness_multiplier <= 0.0 {
            return Err(ConfigError::Validation(
                "dedup.freshness_multiplier must be > 0".into(),
            ));
        }
        if self.dedup.persist && self.dedup.state_dir.is_empty() {
            return Err(ConfigError::Validation(
                "dedup.state_dir must be set when persist is enabled".into(),
            ));
        }
        if !(1..=64).contains(&self.engine.max_concurrent_symbols) {
            return Err(ConfigError::Validation(
                "engine.max_concurrent_symbols must be within 1..=64".into(),
            ));
        }
        if self.engine.symbol_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.symbol_timeout_secs must be > 0".into(),
            ));
        }
        if self.engine.channel_capacity < 16 {
            return Err(ConfigError::Validation(
                "engine.channel_capacity must be >= 16".into(),
            ));
        }
        Ok(())
    }

    /// One-line-per-section summary for startup logging.
    pub fn summary(&self) -> String {
        let bbw_tfs: Vec<String> = self.bbw.timeframes.iter().map(|t| t.to_string()).collect();
        format!(
            "bbw: len={} mult={} contraction={} tol={} sep={} tfs=[{}]\n\
             wavetrend: short={} long={}\n\
             ema: {}/{} zone={}% rearm={}% cooldown={}h tf={}\n\
             sma: {}/{} ranging={}% proximity={}% cooldown={}h tf={}\n\
             dedup: dir={} persist={} freshness_mult={}\n\
             engine: workers={} timeout={}s",
            self.bbw.length,
            self.bbw.multiplier,
            self.bbw.contraction_length,
            self.bbw.tolerance,
            self.bbw.separation_threshold,
            bbw_tfs.join(","),
            self.wavetrend.short_timeframe,
            self.wavetrend.long_timeframe,
            self.ema.fast_period,
            self.ema.slow_period,
            self.ema.zone_pct,
            self.ema.rearm_pct,
            self.ema.cross_cooldown_hours,
            self.ema.timeframe,
            self.sma.fast_period,
            self.sma.slow_period,
            self.sma.ranging_pct,
            self.sma.proximity_pct,
            self.sma.proximity_cooldown_hours,
            self.sma.timeframe,
            self.dedup.state_dir,
            self.dedup.persist,
            self.dedup.freshness_multiplier,
            self.engine.max_concurrent_symbols,
            self.engine.symbol_timeout_secs,
        )
    }
}

// ============================================================================
// Global Accessor
// ============================================================================

static CONFIG: OnceLock<ScannerConfig> = OnceLock::new();

/// Process-wide config. First call wins; later `init_config` calls are
/// rejected once the default has been materialized.
pub fn get_config() -> &'static ScannerConfig {
    CONFIG.get_or_init(ScannerConfig::default)
}

/// Install a loaded config as the global one. Returns false if a config
/// (or the default) was already installed.
pub fn init_config(config: ScannerConfig) -> bool {
    CONFIG.set(config).is_ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bbw.length, 20);
        assert_eq!(config.bbw.contraction_length, 125);
        assert_eq!(config.ema.fast_period, 21);
        assert_eq!(config.ema.slow_period, 50);
        assert_eq!(config.sma.slow_period, 200);
        assert_eq!(config.wavetrend.short_timeframe, Timeframe::H2);
        assert_eq!(config.wavetrend.long_timeframe, Timeframe::H8);
    }

    #[test]
    fn test_validate_rejects_inverted_periods() {
        let mut config = ScannerConfig::default();
        config.ema.fast_period = 60;
        assert!(config.validate().is_err());

        let mut config = ScannerConfig::default();
        config.sma.fast_period = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_engine_limits() {
        let mut config = ScannerConfig::default();
        config.engine.max_concurrent_symbols = 0;
        assert!(config.validate().is_err());

        let mut config = ScannerConfig::default();
        config.engine.max_concurrent_symbols = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.json");

        let mut config = ScannerConfig::default();
        config.bbw.tolerance = 0.02;
        config.engine.max_concurrent_symbols = 4;
        config.save_to_file(&path).unwrap();

        let loaded = ScannerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.bbw.tolerance, 0.02);
        assert_eq!(loaded.engine.max_concurrent_symbols, 4);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let loaded = ScannerConfig::load_from_file("/nonexistent/scanner.json").unwrap();
        assert_eq!(loaded.bbw.length, 20);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"bbw": {"tolerance": 0.01}}"#).unwrap();

        let loaded = ScannerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.bbw.tolerance, 0.01);
        assert_eq!(loaded.bbw.length, 20);
        assert_eq!(loaded.sma.slow_period, 200);
    }

    #[test]
    fn test_summary_mentions_sections() {
        let summary = ScannerConfig::default().summary();
        assert!(summary.contains("bbw:"));
        assert!(summary.contains("wavetrend:"));
        assert!(summary.contains("engine:"));
    }
}
