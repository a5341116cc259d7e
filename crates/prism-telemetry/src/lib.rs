//! Log subscriber setup for Prism
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a
//! text or JSON formatting layer

use prism_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber from configuration
///
/// `RUST_LOG` takes precedence over the configured filter. An invalid
/// filter falls back to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true);

            registry
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);

            registry
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
    }

    tracing::debug!(filter = %config.filter, format = ?config.format, "log subscriber installed");

    Ok(())
}
