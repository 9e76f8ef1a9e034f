//! Diagnostic logging with `tracing`.
//!
//! Logs go to stderr so they never mix with the interactive output on
//! stdout. The filter comes from `MC_AUTO_LOG` (`EnvFilter` syntax) and
//! falls back to a level derived from `-v` flags.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MC_AUTO_LOG";

/// Default filter directive for a `-v` count.
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "mc_auto=info",
        2 => "mc_auto=debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
