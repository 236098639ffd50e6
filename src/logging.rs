//! Tracing/logging configuration.
//!
//! Verbosity flags map to terminal levels (default WARN, verbose INFO,
//! debug DEBUG, quiet ERROR, silent off); output can be pretty, JSON, or
//! compact. Explicit flags take precedence over `RUST_LOG`.

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Clone, Debug, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored human-readable output
    #[default]
    Pretty,
    /// Structured JSON output (one JSON object per line)
    Json,
    /// Compact single-line format
    Compact,
}

/// Tracing configuration built from caller flags
#[derive(Default)]
pub struct TracingConfig {
    /// Verbose mode (INFO level)
    pub verbose: bool,
    /// Debug mode (DEBUG level)
    pub debug: bool,
    /// Quiet mode (ERROR only)
    pub quiet: bool,
    /// Silent mode (no output)
    pub silent: bool,
    /// Output format
    pub format: LogFormat,
}

/// Global flag to track if tracing has been initialized
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize tracing with the given configuration.
///
/// Call once early in the host program after flags are parsed;
/// subsequent calls are ignored.
pub fn init_tracing(config: TracingConfig) {
    if TRACING_INITIALIZED.get().is_some() {
        return;
    }

    let level = if config.silent {
        None
    } else if config.quiet {
        Some(Level::ERROR)
    } else if config.debug {
        Some(Level::DEBUG)
    } else if config.verbose {
        Some(Level::INFO)
    } else {
        Some(Level::WARN)
    };

    let Some(level) = level else {
        // Silent mode - install a no-op subscriber
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
        let _ = TRACING_INITIALIZED.set(());
        return;
    };

    // Explicit flags beat RUST_LOG; otherwise RUST_LOG wins over the default.
    let flags_specified = config.verbose || config.debug || config.quiet;
    let default_filter =
        || EnvFilter::new(format!("x402_pay={},warn", level.as_str().to_lowercase()));
    let filter = if flags_specified {
        default_filter()
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter())
    };

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_ansi(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .compact()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    let _ = TRACING_INITIALIZED.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_default() {
        let format = LogFormat::default();
        assert!(matches!(format, LogFormat::Pretty));
    }

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(!config.verbose);
        assert!(!config.debug);
        assert!(!config.quiet);
        assert!(!config.silent);
    }
}
