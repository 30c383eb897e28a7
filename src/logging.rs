//! Host log setup.
//!
//! One `fmt` subscriber on stderr, filtered by `RUST_LOG`. Relayed backend
//! output arrives under the `backend` target, so `RUST_LOG=backend=off`
//! silences it without hiding supervisor events.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `default_directive` applies when
/// `RUST_LOG` is unset or invalid. Calling this twice is harmless.
pub fn init(default_directive: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
