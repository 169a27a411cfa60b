use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::{
    channels::{builtin_channels, Channel, ChannelRegistry},
    error::{fs_err, LauncherError, Result},
};

pub const CONFIG_FILE_NAME: &str = "launcher.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Archive file stem published next to `version.txt` on every channel.
    pub archive_name: String,
    /// Executable expected at the root of an installed channel.
    pub entrypoint: String,
    pub assets_base: String,
    pub verify_checksums: bool,
    pub timeouts: Timeouts,
    pub retry: RetrySettings,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub version_secs: u64,
    pub engine_secs: u64,
    pub assets_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            archive_name: "SHOE".to_string(),
            entrypoint: "SHOE.exe".to_string(),
            assets_base: "https://downloads.shoe-engine.dev/assets".to_string(),
            verify_checksums: false,
            timeouts: Timeouts::default(),
            retry: RetrySettings::default(),
            channels: builtin_channels(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            version_secs: 30,
            engine_secs: 120,
            assets_secs: 600,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl Timeouts {
    pub fn version(&self) -> Duration {
        Duration::from_secs(self.version_secs)
    }

    pub fn engine(&self) -> Duration {
        Duration::from_secs(self.engine_secs)
    }

    pub fn assets(&self) -> Duration {
        Duration::from_secs(self.assets_secs)
    }
}

impl LauncherConfig {
    /// Reads `<root>/launcher.toml`, falling back to built-in defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| fs_err(&path, e))?;
        Self::from_toml(&contents)
            .map_err(|e| LauncherError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: LauncherConfig =
            toml::from_str(contents).map_err(|e| LauncherError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        require_field("archive_name", &self.archive_name)?;
        require_field("entrypoint", &self.entrypoint)?;
        require_field("assets_base", &self.assets_base)?;
        if self.retry.attempts == 0 {
            return Err(LauncherError::Config("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn channel_registry(&self) -> Result<ChannelRegistry> {
        ChannelRegistry::new(self.channels.clone())
    }

    pub fn starter_assets_url(&self) -> String {
        let base = self.assets_base.trim_end_matches('/');
        format!("{base}/StarterAssets.zip")
    }
}

fn require_field(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LauncherError::Config(format!("config field {name} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LauncherConfig::load(tmp.path()).unwrap();
        assert_eq!(cfg.entrypoint, "SHOE.exe");
        assert_eq!(cfg.timeouts.engine(), Duration::from_secs(120));
        assert_eq!(cfg.timeouts.assets(), Duration::from_secs(600));
        assert_eq!(cfg.channels.len(), 3);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg = LauncherConfig::from_toml(
            r#"
entrypoint = "Editor.exe"

[timeouts]
engine_secs = 45

[[channels]]
name = "Stable"
remote_base = "https://mirror.test/stable"
local_subpath = "Stable"
"#,
        )
        .unwrap();
        assert_eq!(cfg.entrypoint, "Editor.exe");
        assert_eq!(cfg.archive_name, "SHOE");
        assert_eq!(cfg.timeouts.engine_secs, 45);
        assert_eq!(cfg.timeouts.version_secs, 30);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.channel_registry().unwrap().selected().name, "Stable");
    }

    #[test]
    fn rejects_empty_entrypoint_and_zero_attempts() {
        assert!(LauncherConfig::from_toml("entrypoint = \"  \"").is_err());
        assert!(LauncherConfig::from_toml("[retry]\nattempts = 0").is_err());
    }

    #[test]
    fn starter_assets_url_is_fixed_name() {
        let mut cfg = LauncherConfig::default();
        cfg.assets_base = "https://cdn.test/assets/".to_string();
        assert_eq!(cfg.starter_assets_url(), "https://cdn.test/assets/StarterAssets.zip");
    }
}
