//! Tracing bootstrap.

use tracing::Level;

/// Maps a configured level string to a tracing level.
///
/// Unrecognized strings fall back to `info`.
pub fn level_from_str(s: &str) -> Level {
    match s {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global tracing subscriber at the configured level.
///
/// Installation is attempted once; repeat calls (as happens across tests)
/// are quiet no-ops.
pub fn init(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_from_str(log_level))
        .try_init();
}
