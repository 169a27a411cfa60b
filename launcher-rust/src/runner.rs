use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};

use crate::{
    channels::Channel,
    error::{LauncherError, Result},
    projects::Project,
};

/// Executable, arguments and working directory for one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl LaunchPlan {
    pub fn new(install_root: &Path, channel: &Channel, project: &Project, entrypoint: &str) -> Self {
        let engine_dir = channel.install_dir(install_root);
        let args = vec![
            OsString::from(format!("/DXVersion:{}", project.runtime_variant)),
            flag_with_path("/ProjectPath:", &project.path),
            flag_with_path("/EngineInstallPath:", &engine_dir),
        ];
        Self {
            program: engine_dir.join(entrypoint),
            args,
            working_dir: install_root.to_path_buf(),
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null());
        cmd
    }
}

fn flag_with_path(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchReport {
    pub exit_code: Option<i32>,
    pub success: bool,
}

pub fn launch(plan: &LaunchPlan) -> Result<LaunchReport> {
    launch_with(plan, |cmd| cmd.status())
}

/// Runs `plan` through `exec` and waits for it.
///
/// A non-zero exit is reported, not raised.
pub fn launch_with(
    plan: &LaunchPlan,
    mut exec: impl FnMut(&mut Command) -> io::Result<ExitStatus>,
) -> Result<LaunchReport> {
    if !plan.program.is_file() {
        return Err(LauncherError::NotInstalled(plan.program.clone()));
    }

    tracing::info!(program = %plan.program.display(), args = ?plan.args, "launching");
    let mut cmd = plan.command();
    let status = exec(&mut cmd).map_err(|e| LauncherError::FileSystem {
        path: plan.program.clone(),
        source: e,
    })?;

    let report = LaunchReport {
        exit_code: status.code(),
        success: status.success(),
    };
    if report.success {
        tracing::info!("engine exited cleanly");
    } else {
        tracing::warn!(exit_code = ?report.exit_code, "engine exited with failure");
    }
    Ok(report)
}
