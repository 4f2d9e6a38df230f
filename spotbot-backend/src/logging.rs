use crate::config::LoggingConfig;
use anyhow::Context;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::task;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

/// Known level names pass through; anything else becomes `None`
pub fn normalize_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub fn init_logging(config: &LoggingConfig, level: &str) -> anyhow::Result<LoggerGuard> {
    let log_dir = PathBuf::from(&config.dir);
    let normalized = normalize_level(level);
    let default_level: LevelFilter = normalized.unwrap_or("info").parse()?;

    let builder = EnvFilter::builder().with_default_directive(default_level.into());
    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    let console_filter = builder.clone().parse_lossy(&rust_log);
    let file_filter = builder.parse_lossy(&rust_log);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create file appender")?;
    let (non_blocking, guard) = NonBlocking::new(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_filter);
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if normalized.is_none() {
        tracing::warn!("Invalid log level '{}', defaulting to 'info'", level);
    }

    let max_age = Duration::from_secs(60 * 60 * 24 * config.retention_days);
    start_log_cleanup_task(log_dir, config.prefix.clone(), max_age);

    Ok(LoggerGuard(guard))
}

fn start_log_cleanup_task(log_dir: PathBuf, prefix: String, max_age: Duration) {
    task::spawn(async move {
        loop {
            match cleanup_old_logs(&log_dir, &prefix, max_age) {
                Ok(0) => {}
                Ok(n) => tracing::info!("Deleted {} old log files", n),
                Err(e) => tracing::warn!("Failed to delete old log file: {}", e),
            }
            tokio::time::sleep(CLEANUP_INTERVAL).await;
        }
    });
}

fn cleanup_old_logs(log_dir: &Path, prefix: &str, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.starts_with(prefix) || !file_name.ends_with(".log") {
            continue;
        }

        let modified = fs::metadata(&path)?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            fs::remove_file(&path)?;
            tracing::info!("Old log file deleted: {}", file_name);
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("debug"), Some("debug"));
        assert_eq!(normalize_level(" WARN "), Some("warn"));
        assert_eq!(normalize_level("warning"), Some("warn"));
        assert_eq!(normalize_level("verbose"), None);
    }

    #[test]
    fn test_cleanup_keeps_fresh_and_foreign_files() {
        let dir = std::env::temp_dir().join(format!("spotbot-logs-{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("spotbot.2024-01-01.log"), "x").unwrap();
        fs::write(dir.join("other.2024-01-01.log"), "x").unwrap();

        let deleted = cleanup_old_logs(&dir, "spotbot", Duration::from_secs(3600)).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.join("spotbot.2024-01-01.log").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
