// 📝 Logging - tracing subscriber setup shared by the binaries
//
// RUST_LOG wins when set; otherwise the crate logs at `info` and everything
// else stays quiet. Logs go to stderr so CLI output on stdout stays clean.

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "catalog_sync=info";

static INIT: Once = Once::new();

/// Install the global subscriber (safe to call more than once)
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

pub fn init_tracing_with(default_filter: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        // try_init: a test harness may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing_with("debug");
        tracing::info!("still fine after a second init");
    }
}
