//! Tracing setup for the binary.
//!
//! Diagnostics go to stderr so they never interleave with response chunks on
//! stdout. `RUST_LOG` overrides the level chosen by the verbosity flag.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_directive = if verbose { "locutor=debug" } else { "locutor=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
