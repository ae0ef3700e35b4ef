use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use afkbot_client::config::ProjectPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging for a component.
///
/// Console logging is always on. With `to_file`, lines are also appended to
/// `<data dir>/logs/<component>.log`, which is emptied once it grows past 1MB.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(component: &str, to_file: bool) -> io::Result<Option<WorkerGuard>> {
    if !to_file {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        return Ok(None);
    }

    let log_dir = log_directory()?;
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(format!("{}.log", component));
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());

    Ok(Some(guard))
}

fn log_directory() -> io::Result<PathBuf> {
    let paths = ProjectPaths::new("afkbot")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;
    Ok(paths.log_dir())
}

/// Empty the log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<bool> {
    if !log_path.exists() {
        return Ok(false);
    }
    if fs::metadata(log_path)?.len() <= MAX_LOG_SIZE {
        return Ok(false);
    }
    File::create(log_path)?.set_len(0)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_log_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.log");
        fs::write(&path, b"a few lines\n").unwrap();

        assert!(!truncate_if_needed(&path).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().len(), 12);
    }

    #[test]
    fn test_oversized_log_is_emptied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.log");
        fs::write(&path, vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();

        assert!(truncate_if_needed(&path).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_log_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!truncate_if_needed(&dir.path().join("none.log")).unwrap());
    }
}
