// Structured Logging - tracing subscriber setup for the scanner
// Safe to call repeatedly; only the first call installs the subscriber

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::config::LoggingConfig;

static INIT: Once = Once::new();

/// Install the global tracing subscriber. `RUST_LOG` still takes
/// precedence over the configured level for per-target tuning.
pub fn setup_logging(log_level: &str, json_format: bool, console_output: bool) {
    let level = match log_level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    };

    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive(level.into());

        if console_output {
            if json_format {
                tracing_subscriber::fmt()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_env_filter(filter)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_target(true)
                    .with_env_filter(filter)
                    .init();
            }
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }

        tracing::info!(log_level = %log_level, json = json_format, "Logging initialized");
    });
}

/// Convenience wrapper over the config section.
pub fn setup_from_config(config: &LoggingConfig) {
    setup_logging(&config.level, config.json_format, config.console_output);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_idempotent() {
        setup_logging("DEBUG", false, true);
        // Second call must be a no-op, not a panic
        setup_logging("INFO", true, true);
    }
}
