use tracing_subscriber::EnvFilter;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    error::{fs_err, Result},
    paths,
};

const LOG_FILE_NAME: &str = "launcher.log";
pub const LOG_FILTER_ENV: &str = "SHOE_LAUNCHER_LOG";

pub fn open_log_file(root: &Path) -> Result<(PathBuf, File)> {
    let dir = paths::logs_dir(root);
    fs::create_dir_all(&dir).map_err(|e| fs_err(&dir, e))?;
    let log_path = dir.join(LOG_FILE_NAME);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| fs_err(&log_path, e))?;
    Ok((log_path, file))
}

/// Sends `tracing` output to `<root>/logs/launcher.log`.
///
/// A subscriber installed earlier in the process wins; the log file is still
/// created so callers can point users at it.
pub fn init(root: &Path) -> Result<PathBuf> {
    let (log_path, file) = open_log_file(root)?;
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(log_path)
}
