//! Process-wide tracing setup.
//!
//! Logs go to stderr through the `tracing-subscriber` fmt layer. Colors are
//! only used when stderr is a terminal.

use std::io::IsTerminal;

use tracing::Level;

use crate::config::LoggingSettings;

/// The level named by `name` (case-insensitive, `warning` included), or
/// `None` when the name is not a level.
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(Level::WARN),
        other => other.parse().ok(),
    }
}

/// Installs the global subscriber for `settings.level`. An unknown level
/// falls back to `info` and is reported once logging is up.
///
/// Returns `false` when a subscriber was already installed, which happens
/// when tests call this more than once.
pub fn init(settings: &LoggingSettings) -> bool {
    let level = parse_level(&settings.level);

    let installed = tracing_subscriber::fmt()
        .with_max_level(level.unwrap_or(Level::INFO))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .is_ok();

    if level.is_none() {
        tracing::warn!(level = %settings.level, "unknown log level, falling back to info");
    }
    installed
}
