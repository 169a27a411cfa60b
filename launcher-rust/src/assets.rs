use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use std::{path::PathBuf, time::Duration};

use crate::{
    error::{install_err, InstallStage, Result},
    fetch::{Downloader, Transport},
    payload,
    projects::{self, Project},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AssetStatus {
    Idle,
    Downloading { project: String },
    Extracting { project: String },
    Ready { project: String },
    Failed { project: String, message: String },
}

/// Fetches the starter asset pack into new projects.
///
/// Runs independently of the engine install and reports on its own status
/// channel.
pub struct AssetBootstrapper<T> {
    downloader: Downloader<T>,
    url: String,
    timeout: Duration,
    status: watch::Sender<AssetStatus>,
}

impl<T: Transport> AssetBootstrapper<T> {
    pub fn new(downloader: Downloader<T>, url: impl Into<String>, timeout: Duration) -> Self {
        let (status, _) = watch::channel(AssetStatus::Idle);
        Self {
            downloader,
            url: url.into(),
            timeout,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AssetStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> AssetStatus {
        self.status.borrow().clone()
    }

    /// Populates `project/Assets` when the project asked for starter assets.
    ///
    /// Returns `Ok(None)` without touching the network otherwise.
    pub async fn maybe_bootstrap(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        if !project.bootstrap_assets {
            return Ok(None);
        }
        match self.bootstrap(project, cancel).await {
            Ok(dir) => {
                self.status.send_replace(AssetStatus::Ready {
                    project: project.name.clone(),
                });
                Ok(Some(dir))
            }
            Err(err) => {
                tracing::warn!(project = %project.name, error = %err, "starter assets failed");
                self.status.send_replace(AssetStatus::Failed {
                    project: project.name.clone(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn bootstrap(&self, project: &Project, cancel: &CancellationToken) -> Result<PathBuf> {
        projects::create_project_directories(project)?;
        let assets_dir = project.assets_dir();

        self.status.send_replace(AssetStatus::Downloading {
            project: project.name.clone(),
        });
        let archive = self
            .downloader
            .fetch_binary(&self.url, self.timeout, &project.path, cancel)
            .await?;

        self.status.send_replace(AssetStatus::Extracting {
            project: project.name.clone(),
        });
        let dest = assets_dir.clone();
        let files = tokio::task::spawn_blocking(move || {
            let result = payload::extract_zip_file(archive.path(), &dest);
            drop(archive);
            result
        })
        .await
        .map_err(|e| install_err(InstallStage::Extract, e))?
        .map_err(|e| install_err(InstallStage::Extract, e))?;

        tracing::info!(project = %project.name, files, "starter assets installed");
        Ok(assets_dir)
    }
}
