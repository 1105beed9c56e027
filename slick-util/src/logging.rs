//! Logger construction helpers, in the style of `flux::logging`: the crate
//! never reaches for a process-global logger, every subsystem is handed a
//! `slog::Logger` at construction time and forks a child with its own
//! context via `log.new(o!(...))`. `root()` builds the default terminal
//! logger used by examples and tests; embedders are expected to supply
//! their own.

pub use slog::{self, debug, error, info, o, trace, warn, Drain, Logger};

/// Builds a terminal logger at the given level. Intended for examples,
/// binaries and tests — library code should always take a `Logger` as a
/// parameter rather than calling this.
pub fn root(level: &str) -> Logger {
    use sloggers::types::Severity;
    use sloggers::{terminal::TerminalLoggerBuilder, Build};

    let severity: Severity = serdeconv::from_toml_str(&format!("\"{}\"", level))
        .unwrap_or(Severity::Debug);

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity);

    builder.build().expect("failed to build terminal logger")
}

/// A logger that discards everything. Used as the fallback when a
/// constructor is handed `None` for its logger parameter.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
