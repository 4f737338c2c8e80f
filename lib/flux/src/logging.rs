//! Structured logging built on `slog`/`sloggers`. Every binary builds one
//! root logger at startup and threads it through constructors from there on
//! -- no global mutable logger. Subsystems derive a child logger via
//! `log.new(o!("component" => "..."))`.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds the root logger for a binary named `component`, at the given
/// severity. Used by every `services/*` `main.rs` and by `util`'s bins.
pub fn init(component: &'static str, level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);

    let root = builder.build().expect("failed to build root logger");
    root.new(o!("service" => component))
}

/// Root logger with `debug` severity, for tests and local tools where a
/// config file hasn't been loaded yet.
pub fn init_default(component: &'static str) -> Logger {
    init(component, Severity::Debug)
}
