//! Diagnostic logging.
//!
//! `TRELLIS_LOG` takes an `EnvFilter` directive (`debug`, `trellis=trace`, ...).
//! Without it the filter is `warn`, or `debug` when `--debug` is on the
//! command line. Logs go to stderr so command output on stdout stays clean.

use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "TRELLIS_LOG";

/// True when `--debug` appears before any `--` terminator.
pub fn debug_requested<S: AsRef<str>>(args: &[S]) -> bool {
    args.iter()
        .map(AsRef::as_ref)
        .take_while(|a| *a != "--")
        .any(|a| a == "--debug")
}

fn default_directive(debug: bool) -> &'static str {
    if debug { "debug" } else { "warn" }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
