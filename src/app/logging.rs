//! Usage: Tracing setup (console + daily rolling file under `<data_dir>/logs`) and log retention.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "account-pool-hub.log";
pub(crate) const LOG_RETENTION_DAYS: u64 = 7;

struct LocalTimer;

impl fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive for the process lifetime,
/// dropping it flushes and stops the file writer.
pub fn init(log_dir: &Path) -> WorkerGuard {
    let _ = tracing_log::LogTracer::init();

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_level(true)
        .with_timer(LocalTimer);
    let file_layer = fmt::Layer::new()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(LocalTimer);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(log_dir = %log_dir.display(), "日志系统已初始化");

    match cleanup_old_logs(log_dir, LOG_RETENTION_DAYS) {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "已清理过期日志文件"),
        Err(err) => tracing::warn!("过期日志清理失败: {}", err),
    }

    guard
}

/// Removes rolled log files older than `days_to_keep`; returns how many were deleted.
pub(crate) fn cleanup_old_logs(log_dir: &Path, days_to_keep: u64) -> Result<usize, String> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days_to_keep.saturating_mul(24 * 60 * 60)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = std::fs::read_dir(log_dir)
        .map_err(|e| format!("failed to read log dir {}: {e}", log_dir.display()))?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log || !path.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified > cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => tracing::warn!(path = %path.display(), "failed to delete old log file: {}", err),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_keeps_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("account-pool-hub.log.2099-01-01"), "x").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "x").expect("write");

        assert_eq!(cleanup_old_logs(dir.path(), 0).expect("cleanup"), 1);
        assert!(dir.path().join("notes.txt").exists());

        std::fs::write(dir.path().join("account-pool-hub.log.2099-01-02"), "x").expect("write");
        assert_eq!(cleanup_old_logs(dir.path(), 7).expect("cleanup"), 0);
    }

    #[test]
    fn cleanup_reports_missing_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(cleanup_old_logs(&dir.path().join("missing"), 7).is_err());
    }
}
