use std::path::{Path, PathBuf};

use crate::error::{fs_err, Result};

pub const ROOT_ENV: &str = "SHOE_LAUNCHER_ROOT";

pub fn self_path() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| fs_err("<current exe>", e))
}

/// Directory holding the launcher's own files (`projects.txt`, logs, config).
pub fn root_dir() -> Result<PathBuf> {
    if let Ok(dev_root) = std::env::var(ROOT_ENV) {
        if !dev_root.trim().is_empty() {
            return Ok(PathBuf::from(dev_root));
        }
    }
    let exe = self_path()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

pub fn projects_path(root: &Path) -> PathBuf {
    root.join("projects.txt")
}

pub fn install_location_path(root: &Path) -> PathBuf {
    root.join("EngineInstallLocation.txt")
}

pub fn version_marker_path(install_root: &Path) -> PathBuf {
    install_root.join("version.txt")
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}
