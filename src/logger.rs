//! Logging setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the default, e.g. `RUST_LOG=debug` or
/// `RUST_LOG=lineroom=trace`. Otherwise both the library and the binary
/// named `binary_name` log at `default_level`.
pub fn setup_logger(binary_name: &str, default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                default_level,
                binary_name.replace('-', "_"),
                default_level
            ))
        }))
        .init();
}
