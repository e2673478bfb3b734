// Logging setup
//
// Console logging through tracing-subscriber. Library code only emits
// `tracing` events; binaries call `init_tracing` once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither RUST_LOG nor an explicit filter is set
pub const DEFAULT_LOG_FILTER: &str = "tracecheck_core=info,tracecheck_eval=info";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "tracecheck_core=debug")
    pub log_filter: Option<String>,
    /// Include the event target in console output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Read `RUST_LOG`, falling back to `LOG_LEVEL`
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global subscriber from environment configuration.
///
/// Does nothing if a subscriber is already installed, so tests and binaries
/// can both call it.
pub fn init_tracing() {
    init_with(TelemetryConfig::from_env());
}

pub fn init_with(config: TelemetryConfig) {
    let result = tracing_subscriber::registry()
        .with(config.filter())
        .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
        .try_init();

    if result.is_ok() {
        tracing::debug!(filter = ?config.log_filter, "Tracing initialized");
    }
}
