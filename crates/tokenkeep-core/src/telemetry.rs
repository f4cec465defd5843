//! Tracing subscriber setup for embedders.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file prefix inside the log directory
const LOG_FILE_PREFIX: &str = "tokenkeep.log";

/// Install the global subscriber.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=tokenkeep_core=debug).
/// With `log_dir`, events are also written to a daily-rolling file; keep the
/// returned guard alive to flush it. Returns `None` for the guard when a
/// subscriber was already installed.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        guard
    } else {
        None
    }
}
