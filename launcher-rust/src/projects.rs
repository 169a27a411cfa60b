use serde::Serialize;
use std::{
    fmt, fs,
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use crate::error::{fs_err, LauncherError, Result};

/// Rendering backend a project is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuntimeVariant {
    Dx11,
    Dx12,
}

impl RuntimeVariant {
    pub fn index(self) -> u8 {
        match self {
            RuntimeVariant::Dx11 => 0,
            RuntimeVariant::Dx12 => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(RuntimeVariant::Dx11),
            1 => Some(RuntimeVariant::Dx12),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeVariant::Dx11 => f.write_str("DX11"),
            RuntimeVariant::Dx12 => f.write_str("DX12"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub runtime_variant: RuntimeVariant,
    pub bootstrap_assets: bool,
}

impl Project {
    /// New project living at `base_path/name`.
    pub fn new(
        name: &str,
        base_path: &Path,
        runtime_variant: RuntimeVariant,
        bootstrap_assets: bool,
    ) -> Result<Self> {
        validate_name(name)?;
        validate_field("path", &base_path.to_string_lossy())?;
        Ok(Self {
            name: name.to_string(),
            path: base_path.join(name),
            runtime_variant,
            bootstrap_assets,
        })
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.path.join("Assets")
    }

    fn to_record(&self) -> String {
        format!(
            "{},{},{},{}",
            self.name,
            self.path.display(),
            self.runtime_variant.index(),
            self.bootstrap_assets
        )
    }

    fn from_record(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if !(3..=4).contains(&fields.len()) {
            return None;
        }
        let name = fields[0].trim();
        let path = fields[1].trim();
        if name.is_empty() || path.is_empty() {
            return None;
        }
        let runtime_variant = RuntimeVariant::from_index(fields[2].trim().parse().ok()?)?;
        let bootstrap_assets = match fields.get(3) {
            Some(flag) => parse_flag(flag)?,
            None => false,
        };
        Some(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
            runtime_variant,
            bootstrap_assets,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn validate_field(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LauncherError::InvalidProject(format!("{label} is empty")));
    }
    if value.trim() != value {
        return Err(LauncherError::InvalidProject(format!(
            "{label} {value:?} has leading or trailing whitespace"
        )));
    }
    if value.contains(&[',', '\n', '\r'][..]) {
        return Err(LauncherError::InvalidProject(format!(
            "{label} {value:?} may not contain commas or line breaks"
        )));
    }
    Ok(())
}

/// A project name becomes one directory under its base path.
fn validate_name(name: &str) -> Result<()> {
    validate_field("name", name)?;
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(LauncherError::InvalidProject(format!(
            "name {name:?} must be a single folder name"
        ))),
    }
}

/// Result of reading `projects.txt`: the good records and the lines skipped.
#[derive(Debug, Default)]
pub struct ProjectList {
    pub projects: Vec<Project>,
    pub skipped: Vec<LauncherError>,
}

/// Append-only, line-per-project store.
#[derive(Debug)]
pub struct ProjectRegistry {
    path: PathBuf,
    writer: Mutex<()>,
}

impl ProjectRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is an empty registry. Bad lines are skipped and reported.
    pub fn load(&self) -> Result<ProjectList> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ProjectList::default()),
            Err(e) => return Err(fs_err(&self.path, e)),
        };

        let mut list = ProjectList::default();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match Project::from_record(line) {
                Some(project) => list.projects.push(project),
                None => {
                    tracing::warn!(line_number = idx + 1, line, "skipping malformed project record");
                    list.skipped.push(LauncherError::MalformedRecord {
                        line: line.to_string(),
                        line_number: idx + 1,
                    });
                }
            }
        }
        Ok(list)
    }

    pub fn append(&self, project: &Project) -> Result<()> {
        validate_name(&project.name)?;
        validate_field("path", &project.path.to_string_lossy())?;

        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let has_records = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(fs_err(&self.path, e)),
        };
        let record = if has_records {
            format!("\n{}", project.to_record())
        } else {
            project.to_record()
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| fs_err(parent, e))?;
            }
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| fs_err(&self.path, e))?;
        file.write_all(record.as_bytes())
            .map_err(|e| fs_err(&self.path, e))?;
        Ok(())
    }

    /// Builds the project at `base_path/name`, lays out its folders and records it.
    pub fn create_project(
        &self,
        base_path: &Path,
        name: &str,
        runtime_variant: RuntimeVariant,
        bootstrap_assets: bool,
    ) -> Result<Project> {
        let project = Project::new(name, base_path, runtime_variant, bootstrap_assets)?;
        create_project_directories(&project)?;
        self.append(&project)?;
        tracing::info!(name, path = %project.path.display(), "project created");
        Ok(project)
    }
}

pub fn create_project_directories(project: &Project) -> Result<()> {
    for dir in [project.path.clone(), project.assets_dir()] {
        fs::create_dir_all(&dir).map_err(|e| fs_err(&dir, e))?;
    }
    Ok(())
}
