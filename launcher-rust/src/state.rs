use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    error::{fs_err, Result},
    fs_ops, paths,
};

fn read_first_line(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let line = s.lines().next().unwrap_or("").trim().to_string();
            Ok((!line.is_empty()).then_some(line))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(fs_err(path, e)),
    }
}

/// Installed version text, or `None` when nothing has been installed yet.
pub fn read_version_marker(install_root: &Path) -> Result<Option<String>> {
    read_first_line(&paths::version_marker_path(install_root))
}

pub fn write_version_marker(install_root: &Path, version: &str) -> Result<()> {
    let path = paths::version_marker_path(install_root);
    fs_ops::write_bytes_with_retry(&path, version.trim().as_bytes(), 3)
}

/// Install root chosen by the user, stored in `EngineInstallLocation.txt`.
pub fn read_install_root(root: &Path) -> Result<Option<PathBuf>> {
    Ok(read_first_line(&paths::install_location_path(root))?.map(PathBuf::from))
}

pub fn write_install_root(root: &Path, install_root: &Path) -> Result<()> {
    let path = paths::install_location_path(root);
    let text = install_root.to_string_lossy();
    fs_ops::write_bytes_with_retry(&path, text.as_bytes(), 3)
}
