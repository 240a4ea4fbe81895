//! Subscriber setup for embedding applications and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{LedgerError, LedgerResult};

fn build_filter(config: &LoggingConfig) -> LedgerResult<EnvFilter> {
    let configured = EnvFilter::try_new(&config.level)
        .map_err(|e| LedgerError::Config(format!("invalid log level {:?}: {}", config.level, e)))?;
    Ok(EnvFilter::try_from_default_env().unwrap_or(configured))
}

/// Install a global `fmt` subscriber. `RUST_LOG` overrides the configured level.
///
/// Fails with `Config` on an unparsable level or when a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> LedgerResult<()> {
    let filter = build_filter(config)?;

    // journald adds its own timestamps
    let under_systemd =
        std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok();

    let result = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(false)
            .try_init(),
        _ if under_systemd => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .without_time()
            .compact()
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .compact()
            .try_init(),
    };
    result.map_err(|e| LedgerError::Config(format!("logging already initialised: {}", e)))
}
