//! Tracing subscriber setup for the orchestrator process.
//!
//! Log level comes from `DBD_LOG_LEVEL` (or the standard `RUST_LOG` filter
//! syntax), output format from `DBD_LOG_FORMAT` (`text` or `json`).

use std::env;
use tracing_subscriber::{layer::SubscriberExt, registry, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber. Safe to call once per process;
/// returns quietly if a subscriber is already installed.
pub fn init() {
    let log_level = env::var("DBD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = env::var("DBD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let subscriber = registry().with(env_filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let result = if log_format == "json" {
        subscriber.with(fmt_layer.json()).try_init()
    } else {
        subscriber.with(fmt_layer).try_init()
    };

    // Already-initialized is fine: tests and embedders may install their own.
    let _ = result;
}
