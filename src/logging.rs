//! Tracing subscriber initialization.
//!
//! Host processes embedding the engine can call this once at startup; the
//! engine itself only emits `tracing` events and never installs a
//! subscriber on its own.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize a compact global subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `verbose` selects debug
/// over info. Returns quietly if a subscriber is already installed.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    // A host may have installed its own subscriber already; that is fine.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
