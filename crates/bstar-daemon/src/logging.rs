//! Tracing setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber.
///
/// Respects `RUST_LOG`; otherwise defaults to info (or debug with `verbose`).
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,bstar_core=debug,bstar_daemon=debug"
    } else {
        "info,bstar_core=info,bstar_daemon=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
