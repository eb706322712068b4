//! Logging initialization for the CLI.
//!
//! Only the binary installs a subscriber; `esms-core` just emits events.

use tracing::Level;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE for esms's own targets
/// * `json` - emit JSON lines instead of plain text
///
/// `RUST_LOG` is honoured; other crates default to `warn`. Logs go to stderr.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = ["esms", "esms_core"]
        .iter()
        .filter_map(|target| format!("{target}={level}").parse::<Directive>().ok())
        .fold(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            EnvFilter::add_directive,
        );

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
