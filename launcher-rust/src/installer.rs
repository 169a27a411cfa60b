use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{install_err, InstallStage, Result},
    fs_ops, payload,
};

/// Replaces `target_dir` with the contents of `archive`.
///
/// The archive is unpacked into a staging directory beside the target and
/// checked for `entrypoint` before the swap, so the previous install stays
/// in place until a complete one is ready. Returns the installed
/// entrypoint path.
pub fn install_archive(archive: &Path, target_dir: &Path, entrypoint: &str) -> Result<PathBuf> {
    let parent = target_dir
        .parent()
        .ok_or_else(|| install_err(InstallStage::Prepare, "install target has no parent"))?;
    fs::create_dir_all(parent).map_err(|e| install_err(InstallStage::Prepare, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(|e| install_err(InstallStage::Prepare, e))?;

    let files = payload::extract_zip_file(archive, staging.path())
        .map_err(|e| install_err(InstallStage::Extract, e))?;
    tracing::debug!(files, staging = %staging.path().display(), "archive extracted");

    if !staging.path().join(entrypoint).is_file() {
        return Err(install_err(
            InstallStage::Verify,
            format!("archive does not contain {entrypoint}"),
        ));
    }

    let mut backup = InstallBackup::create(target_dir)?;
    let staged = staging.into_path();
    if let Err(e) = fs::rename(&staged, target_dir) {
        let _ = fs::remove_dir_all(&staged);
        if let Err(restore) = backup.restore(target_dir) {
            tracing::error!(%restore, "failed to restore previous install");
        }
        return Err(install_err(InstallStage::Swap, e));
    }
    backup.cleanup();

    Ok(target_dir.join(entrypoint))
}

/// Previous install moved aside for the duration of a swap.
struct InstallBackup {
    path: Option<PathBuf>,
}

impl InstallBackup {
    fn create(target_dir: &Path) -> Result<Self> {
        if !target_dir.exists() {
            return Ok(Self { path: None });
        }
        let backup = fs_ops::temp_path_for(target_dir, "old")
            .map_err(|e| install_err(InstallStage::Swap, e))?;
        fs::rename(target_dir, &backup).map_err(|e| {
            install_err(
                InstallStage::Swap,
                format!("move {} aside: {e}", target_dir.display()),
            )
        })?;
        Ok(Self { path: Some(backup) })
    }

    fn restore(&mut self, target_dir: &Path) -> std::io::Result<()> {
        if let Some(backup) = self.path.take() {
            if !target_dir.exists() {
                fs::rename(&backup, target_dir)?;
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(backup) = self.path.take() {
            if let Err(e) = fs::remove_dir_all(&backup) {
                tracing::warn!(path = %backup.display(), error = %e, "could not remove old install");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::LauncherError, payload::testing::zip_bytes};

    fn write_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("SHOE.zip");
        fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }

    fn stage_of(err: LauncherError) -> InstallStage {
        match err {
            LauncherError::Install { stage, .. } => stage,
            other => panic!("expected install error, got {other:?}"),
        }
    }

    #[test]
    fn fresh_install_creates_target() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(tmp.path(), &[("SHOE.exe", "v1")]);
        let target = tmp.path().join("Engine").join("Stable");

        let exe = install_archive(&archive, &target, "SHOE.exe").unwrap();

        assert_eq!(exe, target.join("SHOE.exe"));
        assert_eq!(fs::read_to_string(&exe).unwrap(), "v1");
    }

    #[test]
    fn update_replaces_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("Stable");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("SHOE.exe"), "v1").unwrap();
        fs::write(target.join("stale.dll"), "old").unwrap();

        let archive = write_archive(tmp.path(), &[("SHOE.exe", "v2")]);
        install_archive(&archive, &target, "SHOE.exe").unwrap();

        assert_eq!(fs::read_to_string(target.join("SHOE.exe")).unwrap(), "v2");
        assert!(!target.join("stale.dll").exists());
        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with(".Stable.old-")), "{names:?}");
        assert!(names.iter().all(|n| !n.starts_with(".staging-")), "{names:?}");
    }

    #[test]
    fn archive_without_entrypoint_keeps_old_install() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("Stable");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("SHOE.exe"), "v1").unwrap();

        let archive = write_archive(tmp.path(), &[("README.txt", "oops")]);
        let err = install_archive(&archive, &target, "SHOE.exe").unwrap_err();

        assert_eq!(stage_of(err), InstallStage::Verify);
        assert_eq!(fs::read_to_string(target.join("SHOE.exe")).unwrap(), "v1");
        assert!(!target.join("README.txt").exists());
    }

    #[test]
    fn corrupt_archive_fails_at_extract() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("SHOE.zip");
        fs::write(&archive, "truncated").unwrap();
        let target = tmp.path().join("Stable");

        let err = install_archive(&archive, &target, "SHOE.exe").unwrap_err();

        assert_eq!(stage_of(err), InstallStage::Extract);
        assert!(!target.exists());
    }
}
