//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events. The binary installs the
//! subscriber once at startup; diagnostics go to stderr so stdout stays
//! reserved for results and JSON envelopes.

use tracing::Level;

/// Max level for the given debug switch.
#[must_use]
pub fn level_for(debug: bool) -> Level {
    if debug { Level::DEBUG } else { Level::INFO }
}

/// Installs the fmt subscriber writing to stderr.
///
/// Returns `false` when a global subscriber was already installed, which
/// happens when tests initialize logging more than once.
pub fn init_logging(debug: bool) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level_for(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
