//! Tracing bootstrap shared by the vigil binaries.

use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Log level comes from `RUST_LOG` (default `info`); set
/// `RUST_LOG_FORMAT=json` for machine-readable output.
pub fn init_tracing() {
    initialize(LevelFilter::INFO, false);
}

/// Like [`init_tracing`] but tolerates an already-installed subscriber,
/// so test binaries can call it from every test.
pub fn try_init_tracing() {
    initialize(LevelFilter::INFO, true);
}

fn initialize(level: LevelFilter, fallible: bool) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match var("RUST_LOG_FORMAT").unwrap_or_default().as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed(),
    };

    let registry = tracing_subscriber::registry().with(log_layer);
    if fallible {
        let _ = registry.try_init();
    } else {
        registry.init();
    }
}
