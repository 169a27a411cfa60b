use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{fs_err, LauncherError, Result};

fn retry<F>(mut op: F, attempts: usize) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let mut delay = Duration::from_millis(50);
    let mut last = None;
    for i in 0..attempts.max(1) {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::debug!(attempt = i + 1, %err, "filesystem write failed");
                last = Some(err);
            }
        }
        if i + 1 < attempts {
            std::thread::sleep(delay);
            delay = std::cmp::min(delay * 2, Duration::from_millis(500));
        }
    }
    Err(last.unwrap_or_else(|| {
        LauncherError::Config("retry called with zero attempts".to_string())
    }))
}

/// Sibling path for a staged copy of `dest`, unique per call.
pub fn temp_path_for(dest: &Path, tag: &str) -> Result<PathBuf> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .ok_or_else(|| {
            fs_err(
                dest,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?
        .to_string_lossy();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_millis(0))
        .as_nanos();
    Ok(parent.join(format!(".{name}.{tag}-{nonce}")))
}

fn write_bytes_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| fs_err(parent, e))?;
        }
    }
    let tmp = temp_path_for(dest, "tmp")?;
    fs::write(&tmp, bytes).map_err(|e| fs_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(fs_err(dest, e));
    }
    Ok(())
}

/// Replaces `dest` with `bytes` via a temp file and rename, retrying on failure.
pub fn write_bytes_with_retry(dest: &Path, bytes: &[u8], attempts: usize) -> Result<()> {
    retry(|| write_bytes_atomic(dest, bytes), attempts)
}
