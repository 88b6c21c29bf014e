use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a fmt subscriber writing through the test harness.
///
/// The filter comes from `RUST_LOG`, falling back to `rowkit=debug` for this
/// workspace and `warn` elsewhere. Safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn,rowkit=debug,rowkit_db=debug,rowkit_testing=debug")
        });
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already installed, keeping it");
        }
    });
}
