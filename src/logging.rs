use anyhow::{Context, Result};
#[cfg(not(target_os = "macos"))]
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "projection-test.log";
const LOG_DIR_ENV: &str = "PROJECTION_TEST_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Subsystem used for macOS unified logging (os_log).
#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.hogelab.projection-test";

/// Install stderr and rolling-file logging.
///
/// The returned guard flushes the file writer on drop and must live until
/// shutdown.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    #[cfg(target_os = "macos")]
    {
        let oslog_layer = tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, "default");

        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .with(file_layer)
            .with(oslog_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    #[cfg(not(target_os = "macos"))]
    {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(guard)
}

/// Stderr-only logging, used when the log directory is unusable
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn resolve_log_dir() -> Result<PathBuf> {
    match std::env::var_os(LOG_DIR_ENV) {
        Some(override_path) => Ok(PathBuf::from(override_path)),
        None => platform_log_dir(),
    }
}

/// `~/Library/Logs/projection-test`
#[cfg(target_os = "macos")]
fn platform_log_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .context("Failed to determine home directory for log path")?;
    Ok(home.join("Library").join("Logs").join("projection-test"))
}

#[cfg(target_os = "windows")]
fn platform_log_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("Logs"))
}

/// XDG state dir where available, local data dir otherwise
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_log_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs()?;
    let base = proj_dirs
        .state_dir()
        .unwrap_or_else(|| proj_dirs.data_local_dir());
    Ok(base.join("logs"))
}

#[cfg(not(target_os = "macos"))]
fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "hogelab", "projection-test")
        .context("Failed to determine project directories for log path")
}

fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if !file_name.starts_with(LOG_FILE_BASENAME) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_fresh_and_foreign_files() {
        let dir = std::env::temp_dir().join(format!("projection-test-logs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let fresh = dir.join(format!("{}.2026-10-19", LOG_FILE_BASENAME));
        let other = dir.join("unrelated.txt");
        std::fs::write(&fresh, "log").unwrap();
        std::fs::write(&other, "keep").unwrap();

        prune_old_logs(&dir, Duration::from_secs(60 * 60));
        assert!(fresh.exists());
        assert!(other.exists());

        // Zero max age: everything with our prefix is stale
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(&dir, Duration::ZERO);
        assert!(!fresh.exists());
        assert!(other.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_platform_log_dir_under_library_logs() {
        let dir = platform_log_dir().unwrap();
        assert!(dir.ends_with("Library/Logs/projection-test"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_platform_log_dir_in_state_dir() {
        let dir = platform_log_dir().unwrap();
        assert!(dir.ends_with("projection-test/logs"));
    }
}
