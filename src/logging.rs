//! Logging initialization.
//!
//! The crate logs through `tracing`. Applications (and benches or tests that
//! want output) install a subscriber once with [`init_logging`].

use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber once.
///
/// Filter precedence: `config.filter`, then `RUST_LOG`, then `info`.
/// Later calls are ignored, as is an already-installed foreign subscriber.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.filter.as_deref() {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info")),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(config.ansi)
            .with_target(true)
            .with_filter(filter);

        if tracing_subscriber::registry().with(fmt_layer).try_init().is_ok() {
            tracing::debug!("logging initialized");
        }
    });
}
