//! Baby log application library.
//!
//! Wires the core timeline to SQLite storage, configuration and logging, and
//! exposes the [`Tracker`] handle a UI drives.

mod config;
mod tracker;

pub use config::{Config, DEFAULT_STORAGE_KEY, dirs_data_path};
pub use tracker::Tracker;

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `verbose` forces debug output; otherwise `RUST_LOG` decides.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_repeatable() {
        init_tracing(true);
        init_tracing(false);
        tracing::debug!("subscriber installed");
    }
}
