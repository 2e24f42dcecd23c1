//! Logging configuration with journald support on Linux.
//!
//! Passes are usually launched by a scheduler or the watch daemon, so logs go
//! to the systemd journal when it is reachable and to a rolling file in the
//! data directory otherwise.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// Log level is read from `HALOREEL_LOG` (default `info`). When `stderr` is
/// set, events are also written to standard error, which the one-shot command
/// uses for `--verbose`.
pub fn init(log_dir: Option<PathBuf>, stderr: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("HALOREEL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .with(stderr.then(|| fmt::layer().with_writer(std::io::stderr)))
                .try_init()?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| crate::config::Config::data_dir().join("logs"));

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "haloreel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer flushes on drop; keep it for the life of the process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(stderr.then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init()?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}
