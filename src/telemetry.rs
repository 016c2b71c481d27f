use tracing::debug;

use crate::config::AuthConfig;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Returns false if a subscriber was
/// already installed (tests and embedding applications call this freely).
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        debug!("Logging initialized. Set RUST_LOG environment variable to control log levels");
        debug!("Example: RUST_LOG=authkit=trace,authkit::common::dedup=debug");
    }
    installed
}

/// Install the subscriber using the configured default filter
pub fn init_from_config(config: &AuthConfig) -> bool {
    init_tracing(&config.log_filter.0)
}
