use thiserror::Error;
use std::{fmt, path::PathBuf};

/// Step of an engine install that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Prepare,
    Extract,
    Verify,
    Swap,
    Marker,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Prepare => "prepare",
            InstallStage::Extract => "extract",
            InstallStage::Verify => "verify",
            InstallStage::Swap => "swap",
            InstallStage::Marker => "version marker",
        };
        f.write_str(name)
    }
}

/// Error surface shared by every launcher operation.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("network error fetching {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("install failed during {stage}: {cause}")]
    Install { stage: InstallStage, cause: String },

    #[error("filesystem error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("an install is already in progress for channel '{0}'")]
    OperationInProgress(String),

    #[error("no engine install location configured")]
    NoInstallRootConfigured,

    #[error("malformed record on line {line_number}: {line:?}")]
    MalformedRecord { line: String, line_number: usize },

    #[error("invalid version string {0:?}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("engine executable not found at {}", .0.display())]
    NotInstalled(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = LauncherError> = std::result::Result<T, E>;

pub(crate) fn fs_err(path: impl Into<PathBuf>, source: std::io::Error) -> LauncherError {
    LauncherError::FileSystem {
        path: path.into(),
        source,
    }
}

pub(crate) fn install_err(stage: InstallStage, cause: impl fmt::Display) -> LauncherError {
    LauncherError::Install {
        stage,
        cause: cause.to_string(),
    }
}
