use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use crate::{
    channels::Channel,
    config::LauncherConfig,
    error::{fs_err, install_err, InstallStage, LauncherError, Result},
    fetch::{Downloader, Transport},
    installer, payload, state,
    version::{stamps_differ, Version},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LauncherStatus {
    Initializing,
    CheckingForUpdates,
    Installing,
    UpdatingChannel,
    Running,
    Failed,
}

impl fmt::Display for LauncherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LauncherStatus::Initializing => "Initializing",
            LauncherStatus::CheckingForUpdates => "Checking for updates",
            LauncherStatus::Installing => "Installing",
            LauncherStatus::UpdatingChannel => "Updating",
            LauncherStatus::Running => "Ready",
            LauncherStatus::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// What the caller renders: the current status plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: LauncherStatus,
    pub channel: Option<String>,
    pub message: Option<String>,
}

impl StatusReport {
    fn new(status: LauncherStatus, channel: Option<&Channel>, message: Option<String>) -> Self {
        Self {
            status,
            channel: channel.map(|c| c.name.clone()),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub channel: String,
    pub version: String,
    pub executable: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpToDate { channel: String, version: String },
    Installed(InstallOutcome),
}

/// Knobs the install pipeline reads from [`LauncherConfig`].
#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub archive_name: String,
    pub entrypoint: String,
    pub archive_timeout: Duration,
    pub verify_checksums: bool,
}

impl From<&LauncherConfig> for InstallSettings {
    fn from(cfg: &LauncherConfig) -> Self {
        Self {
            archive_name: cfg.archive_name.clone(),
            entrypoint: cfg.entrypoint.clone(),
            archive_timeout: cfg.timeouts.engine(),
            verify_checksums: cfg.verify_checksums,
        }
    }
}

const TRANSITION_BACKLOG: usize = 64;

/// Drives version check, download, extract and marker write for a channel.
///
/// The current status is kept on a watch channel and every transition is
/// also sent on a broadcast channel. Operations return typed results so the
/// caller decides how to present failures.
pub struct UpdateOrchestrator<T> {
    downloader: Downloader<T>,
    settings: InstallSettings,
    status: watch::Sender<StatusReport>,
    transitions: broadcast::Sender<StatusReport>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a channel busy until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.key);
    }
}

impl<T: Transport> UpdateOrchestrator<T> {
    pub fn new(downloader: Downloader<T>, settings: InstallSettings) -> Self {
        let (status, _) = watch::channel(StatusReport::new(
            LauncherStatus::Initializing,
            None,
            None,
        ));
        let (transitions, _) = broadcast::channel(TRANSITION_BACKLOG);
        Self {
            downloader,
            settings,
            status,
            transitions,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status.subscribe()
    }

    /// Every published report in order, for callers that log transitions.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StatusReport> {
        self.transitions.subscribe()
    }

    pub fn status(&self) -> StatusReport {
        self.status.borrow().clone()
    }

    pub fn executable_path(&self, install_root: &Path, channel: &Channel) -> PathBuf {
        channel
            .install_dir(install_root)
            .join(&self.settings.entrypoint)
    }

    fn publish(&self, status: LauncherStatus, channel: Option<&Channel>, message: Option<String>) {
        tracing::info!(%status, channel = channel.map(|c| c.name.as_str()), message = message.as_deref(), "status");
        let report = StatusReport::new(status, channel, message);
        let _ = self.transitions.send(report.clone());
        self.status.send_replace(report);
    }

    fn fail(&self, channel: Option<&Channel>, err: LauncherError) -> LauncherError {
        self.publish(LauncherStatus::Failed, channel, Some(err.to_string()));
        err
    }

    fn begin(&self, install_root: &Path, channel: &Channel) -> Result<InFlight<'_>> {
        let key = guard_key(install_root, channel);
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(key.clone()) {
            return Err(LauncherError::OperationInProgress(channel.name.clone()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            key,
        })
    }

    /// Confirms the install root is usable and moves out of `Initializing`.
    pub fn initialize(&self, install_root: Option<&Path>) -> Result<()> {
        let result = require_install_root(install_root).and_then(|root| {
            std::fs::create_dir_all(root).map_err(|e| fs_err(root, e))
        });
        match result {
            Ok(()) => {
                self.publish(LauncherStatus::Running, None, None);
                Ok(())
            }
            Err(err) => Err(self.fail(None, err)),
        }
    }

    pub async fn check_for_updates(
        &self,
        install_root: &Path,
        channel: &Channel,
        cancel: &CancellationToken,
    ) -> Result<CheckOutcome> {
        let install_root =
            require_install_root(Some(install_root)).map_err(|e| self.fail(Some(channel), e))?;
        let _busy = self.begin(install_root, channel)?;
        self.publish(LauncherStatus::CheckingForUpdates, Some(channel), None);

        let result = self.check_locked(install_root, channel, cancel).await;
        result.map_err(|e| self.fail(Some(channel), e))
    }

    async fn check_locked(
        &self,
        install_root: &Path,
        channel: &Channel,
        cancel: &CancellationToken,
    ) -> Result<CheckOutcome> {
        let local = state::read_version_marker(install_root)?;
        let remote = self.fetch_remote_version(channel, cancel).await?;

        let Some(local) = local else {
            tracing::info!(channel = %channel.name, %remote, "no local install, installing");
            self.publish(LauncherStatus::Installing, Some(channel), None);
            let outcome = self
                .install_locked(install_root, channel, &remote, cancel)
                .await?;
            return Ok(CheckOutcome::Installed(outcome));
        };

        if stamps_differ(&local, &remote) {
            tracing::info!(channel = %channel.name, %local, %remote, "update available");
            self.publish(
                LauncherStatus::UpdatingChannel,
                Some(channel),
                Some(format!("{local} -> {remote}")),
            );
            let outcome = self
                .install_locked(install_root, channel, &remote, cancel)
                .await?;
            return Ok(CheckOutcome::Installed(outcome));
        }

        self.publish(
            LauncherStatus::Running,
            Some(channel),
            Some(format!("No update available for {} ({local})", channel.name)),
        );
        Ok(CheckOutcome::UpToDate {
            channel: channel.name.clone(),
            version: local,
        })
    }

    async fn fetch_remote_version(
        &self,
        channel: &Channel,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let text = self
            .downloader
            .fetch_text(&channel.version_url(), cancel)
            .await?;
        let remote = text.lines().next().unwrap_or("").trim().to_string();
        if remote.is_empty() {
            return Err(LauncherError::Parse(text));
        }
        if remote.parse::<Version>().is_err() {
            tracing::warn!(channel = %channel.name, %remote, "remote version is not MAJOR.MINOR.PATCH");
        }
        Ok(remote)
    }

    /// Downloads and installs `remote_version` for `channel`.
    ///
    /// Rejected with `OperationInProgress` while another check or install
    /// holds the same channel.
    pub async fn install(
        &self,
        install_root: &Path,
        channel: &Channel,
        remote_version: &str,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        let install_root =
            require_install_root(Some(install_root)).map_err(|e| self.fail(Some(channel), e))?;
        let _busy = self.begin(install_root, channel)?;
        let status = match state::read_version_marker(install_root) {
            Ok(Some(_)) => LauncherStatus::UpdatingChannel,
            Ok(None) => LauncherStatus::Installing,
            Err(err) => return Err(self.fail(Some(channel), err)),
        };
        self.publish(status, Some(channel), None);

        self.install_locked(install_root, channel, remote_version, cancel)
            .await
            .map_err(|e| self.fail(Some(channel), e))
    }

    async fn install_locked(
        &self,
        install_root: &Path,
        channel: &Channel,
        remote_version: &str,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        let archive_url = channel.archive_url(&self.settings.archive_name);
        let archive = self
            .downloader
            .fetch_binary(
                &archive_url,
                self.settings.archive_timeout,
                install_root,
                cancel,
            )
            .await?;

        let digest = payload::sha256_file(archive.path())
            .map_err(|e| install_err(InstallStage::Verify, e))?;
        tracing::info!(url = %archive_url, sha256 = %digest, "archive downloaded");
        if self.settings.verify_checksums {
            let expected = self
                .downloader
                .fetch_text(&format!("{archive_url}.sha256"), cancel)
                .await?;
            if payload::normalize_hex(&expected) != digest {
                return Err(install_err(
                    InstallStage::Verify,
                    format!("sha256 mismatch for {archive_url}"),
                ));
            }
        }

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }

        let target = channel.install_dir(install_root);
        let entrypoint = self.settings.entrypoint.clone();
        let executable = tokio::task::spawn_blocking(move || {
            let result = installer::install_archive(archive.path(), &target, &entrypoint);
            drop(archive);
            result
        })
        .await
        .map_err(|e| install_err(InstallStage::Extract, e))??;

        state::write_version_marker(install_root, remote_version).map_err(|e| {
            install_err(InstallStage::Marker, e)
        })?;

        self.publish(
            LauncherStatus::Running,
            Some(channel),
            Some(format!("{} updated to {remote_version}", channel.name)),
        );
        Ok(InstallOutcome {
            channel: channel.name.clone(),
            version: remote_version.trim().to_string(),
            executable,
        })
    }
}

/// Same root spelled differently (trailing separator, `.`/`..` segments,
/// relative) must map to one key.
fn guard_key(install_root: &Path, channel: &Channel) -> String {
    let root = std::fs::canonicalize(install_root)
        .unwrap_or_else(|_| install_root.components().collect::<PathBuf>());
    format!("{}|{}", root.display(), channel.name)
}

fn require_install_root(install_root: Option<&Path>) -> Result<&Path> {
    match install_root {
        Some(root) if !root.as_os_str().is_empty() => Ok(root),
        _ => Err(LauncherError::NoInstallRootConfigured),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{RetryPolicy, TransportError};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn get_text(&self, url: &str, _t: Duration) -> Result<String, TransportError> {
            Err(TransportError::fatal(format!("offline: {url}")))
        }

        async fn get_to_file(
            &self,
            url: &str,
            _t: Duration,
            _dest: &mut tokio::fs::File,
        ) -> Result<u64, TransportError> {
            Err(TransportError::fatal(format!("offline: {url}")))
        }
    }

    fn orchestrator() -> UpdateOrchestrator<Offline> {
        let downloader = Downloader::new(Offline, RetryPolicy::default(), Duration::from_secs(1));
        UpdateOrchestrator::new(downloader, InstallSettings::from(&LauncherConfig::default()))
    }

    #[test]
    fn starts_initializing() {
        let orch = orchestrator();
        assert_eq!(orch.status().status, LauncherStatus::Initializing);
    }

    #[test]
    fn initialize_without_root_fails() {
        let orch = orchestrator();
        let err = orch.initialize(None).unwrap_err();
        assert!(matches!(err, LauncherError::NoInstallRootConfigured));
        assert_eq!(orch.status().status, LauncherStatus::Failed);

        let err = orch.initialize(Some(Path::new(""))).unwrap_err();
        assert!(matches!(err, LauncherError::NoInstallRootConfigured));
    }

    #[test]
    fn initialize_creates_root_and_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Engine");
        let orch = orchestrator();
        orch.initialize(Some(&root)).unwrap();
        assert!(root.is_dir());
        assert_eq!(orch.status().status, LauncherStatus::Running);
    }

    #[tokio::test]
    async fn empty_install_root_fails_before_any_io() {
        let orch = orchestrator();
        let channel = Channel::new("Stable", "https://a.test/stable", "Stable");
        let err = orch
            .check_for_updates(Path::new(""), &channel, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::NoInstallRootConfigured));
        let report = orch.status();
        assert_eq!(report.status, LauncherStatus::Failed);
        assert_eq!(report.channel.as_deref(), Some("Stable"));
    }

    #[test]
    fn busy_channel_is_rejected_until_released() {
        let orch = orchestrator();
        let channel = Channel::new("Stable", "https://a.test/stable", "Stable");
        let other = Channel::new("Canary", "https://a.test/canary", "Canary");
        let root = Path::new("/opt/shoe");

        let guard = orch.begin(root, &channel).unwrap();
        assert!(matches!(
            orch.begin(root, &channel),
            Err(LauncherError::OperationInProgress(_))
        ));
        let _other = orch.begin(root, &other).unwrap();
        drop(guard);
        orch.begin(root, &channel).unwrap();
    }

    #[test]
    fn root_spellings_share_one_guard() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        let orch = orchestrator();
        let channel = Channel::new("Stable", "https://a.test/stable", "Stable");

        let _guard = orch.begin(tmp.path(), &channel).unwrap();
        for alias in [
            tmp.path().join(""),
            tmp.path().join("."),
            tmp.path().join("sub").join(".."),
        ] {
            assert!(
                matches!(
                    orch.begin(&alias, &channel),
                    Err(LauncherError::OperationInProgress(_))
                ),
                "{}",
                alias.display()
            );
        }

        let missing = Path::new("/opt/shoe-missing-root");
        let _other = orch.begin(missing, &channel).unwrap();
        assert!(orch.begin(&missing.join(""), &channel).is_err());
    }

    #[tokio::test]
    async fn transitions_are_broadcast_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator();
        let mut rx = orch.subscribe_transitions();
        let channel = Channel::new("Stable", "https://a.test/stable", "Stable");

        orch.initialize(Some(tmp.path())).unwrap();
        let _ = orch
            .check_for_updates(tmp.path(), &channel, &CancellationToken::new())
            .await;

        let mut seen = Vec::new();
        while let Ok(report) = rx.try_recv() {
            seen.push(report.status);
        }
        assert_eq!(
            seen,
            [
                LauncherStatus::Running,
                LauncherStatus::CheckingForUpdates,
                LauncherStatus::Failed
            ]
        );
    }

    #[tokio::test]
    async fn unreadable_marker_fails_install_before_download() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("version.txt")).unwrap();
        let orch = orchestrator();
        let channel = Channel::new("Stable", "https://a.test/stable", "Stable");

        let err = orch
            .install(tmp.path(), &channel, "1.0.0", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::FileSystem { .. }));
        assert_eq!(orch.status().status, LauncherStatus::Failed);
    }

    #[test]
    fn executable_path_uses_channel_subpath() {
        let orch = orchestrator();
        let channel = Channel::new("Canary", "https://a.test/canary", "CanaryBuild");
        assert_eq!(
            orch.executable_path(Path::new("/opt/shoe"), &channel),
            Path::new("/opt/shoe").join("CanaryBuild").join("SHOE.exe")
        );
    }
}
