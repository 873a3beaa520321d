use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the stderr log subscriber
///
/// If `RUST_LOG` is not set, defaults to `debug` in debug builds and `info`
/// otherwise. Stdout stays reserved for the instruction stream.
pub fn setup_logging() {
    let defaulted = std::env::var("RUST_LOG").is_err();
    if defaulted {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    if defaulted {
        tracing::info!(
            "RUST_LOG set to default: {}",
            std::env::var("RUST_LOG").unwrap_or_default()
        );
    }
}
