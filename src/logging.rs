//! Logging configuration with journald support on Linux.
//!
//! Events go to systemd's journal when it is reachable, otherwise to a daily
//! rolling file. With `mirror_stderr` set they are also written to stderr.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter (`debug`, `trapcount=trace`, ...).
pub const LOG_ENV: &str = "TRAPCOUNT_LOG";

/// Initialize the logging system. Call once at startup.
pub fn init(log_dir: Option<PathBuf>, mirror_stderr: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = mirror_stderr.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(env_filter)
                .with(journald_layer)
                .init();

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "trapcount.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer thread stops when the guard drops; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}
