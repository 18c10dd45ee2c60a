use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable that switches logging to a debug file
pub const DEBUG_ENV: &str = "TRACKMIX_DEBUG";

/// Initialize logging.
///
/// With `TRACKMIX_DEBUG` set, everything down to DEBUG goes to a daily log
/// file and the returned guard must be kept alive. Otherwise logs go to
/// stderr filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() -> Option<WorkerGuard> {
    if std::env::var_os(DEBUG_ENV).is_some() {
        let log_dir = log_dir();
        let _ = std::fs::create_dir_all(&log_dir);

        let file_appender = tracing_appender::rolling::daily(&log_dir, "trackmix.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
            .init();

        tracing::info!("trackmix logging initialized in {}", log_dir.display());
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .init();
        None
    }
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trackmix")
}
