use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};

use crate::error::{LauncherError, Result};

/// A release track with its own remote base and local install folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub remote_base: String,
    pub local_subpath: String,
}

impl Channel {
    pub fn new(name: &str, remote_base: &str, local_subpath: &str) -> Self {
        Self {
            name: name.to_string(),
            remote_base: remote_base.to_string(),
            local_subpath: local_subpath.to_string(),
        }
    }

    pub fn remote_url(&self, file: &str) -> String {
        let base = self.remote_base.trim_end_matches('/');
        format!("{base}/{file}")
    }

    pub fn version_url(&self) -> String {
        self.remote_url("version.txt")
    }

    pub fn archive_url(&self, archive_name: &str) -> String {
        self.remote_url(&format!("{archive_name}.zip"))
    }

    pub fn install_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.local_subpath)
    }
}

pub fn builtin_channels() -> Vec<Channel> {
    vec![
        Channel::new(
            "Stable",
            "https://downloads.shoe-engine.dev/releases/stable",
            "Stable",
        ),
        Channel::new(
            "Canary",
            "https://downloads.shoe-engine.dev/releases/canary",
            "Canary",
        ),
        Channel::new(
            "Experimental",
            "https://downloads.shoe-engine.dev/releases/experimental",
            "Experimental",
        ),
    ]
}

/// Fixed, ordered channel list with exactly one selection.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    selected: usize,
}

impl ChannelRegistry {
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(LauncherError::Config("no release channels configured".into()));
        }
        let mut seen = HashSet::new();
        let mut subpaths = HashSet::new();
        for channel in &channels {
            if channel.name.trim().is_empty() {
                return Err(LauncherError::Config("channel name is empty".into()));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(LauncherError::Config(format!(
                    "duplicate channel '{}'",
                    channel.name
                )));
            }
            if channel.local_subpath.trim().is_empty() {
                return Err(LauncherError::Config(format!(
                    "channel '{}' has an empty local_subpath",
                    channel.name
                )));
            }
            if !is_single_folder(&channel.local_subpath) {
                return Err(LauncherError::Config(format!(
                    "channel '{}' local_subpath {:?} must be one folder inside the install root",
                    channel.name, channel.local_subpath
                )));
            }
            // Case-insensitive.
            if !subpaths.insert(channel.local_subpath.to_ascii_lowercase()) {
                return Err(LauncherError::Config(format!(
                    "channel '{}' shares local_subpath {:?} with another channel",
                    channel.name, channel.local_subpath
                )));
            }
            reqwest::Url::parse(&channel.remote_base).map_err(|e| {
                LauncherError::Config(format!(
                    "channel '{}' remote_base {:?}: {e}",
                    channel.name, channel.remote_base
                ))
            })?;
        }
        Ok(Self {
            channels,
            selected: 0,
        })
    }

    pub fn list(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, name: &str) -> Result<&Channel> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| LauncherError::UnknownChannel(name.to_string()))
    }

    /// Makes `name` the selected channel. The selection is left alone on error.
    pub fn select(&mut self, name: &str) -> Result<&Channel> {
        let idx = self
            .channels
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| LauncherError::UnknownChannel(name.to_string()))?;
        self.selected = idx;
        Ok(&self.channels[idx])
    }

    pub fn selected(&self) -> &Channel {
        &self.channels[self.selected]
    }
}

fn is_single_folder(subpath: &str) -> bool {
    let mut components = Path::new(subpath).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_channel_is_selected_initially() {
        let reg = ChannelRegistry::new(builtin_channels()).unwrap();
        assert_eq!(reg.selected().name, "Stable");
        let names: Vec<&str> = reg.list().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Stable", "Canary", "Experimental"]);
    }

    #[test]
    fn select_unknown_keeps_previous_selection() {
        let mut reg = ChannelRegistry::new(builtin_channels()).unwrap();
        reg.select("Canary").unwrap();
        let err = reg.select("Nightly").unwrap_err();
        assert!(matches!(err, LauncherError::UnknownChannel(ref n) if n == "Nightly"));
        assert_eq!(reg.selected().name, "Canary");
    }

    #[test]
    fn rejects_duplicate_and_bad_urls() {
        let dup = vec![
            Channel::new("Stable", "https://a.test/s", "Stable"),
            Channel::new("Stable", "https://a.test/t", "Other"),
        ];
        assert!(matches!(
            ChannelRegistry::new(dup),
            Err(LauncherError::Config(_))
        ));

        let bad = vec![Channel::new("Stable", "not a url", "Stable")];
        assert!(matches!(
            ChannelRegistry::new(bad),
            Err(LauncherError::Config(_))
        ));
        assert!(matches!(
            ChannelRegistry::new(Vec::new()),
            Err(LauncherError::Config(_))
        ));
    }

    #[test]
    fn local_subpath_must_stay_inside_install_root() {
        for subpath in ["../../outside", "..", "Stable/Nested", "/opt/other"] {
            let channels = vec![Channel::new("Stable", "https://a.test/s", subpath)];
            assert!(
                matches!(ChannelRegistry::new(channels), Err(LauncherError::Config(_))),
                "{subpath:?}"
            );
        }
    }

    #[test]
    fn local_subpaths_are_unique() {
        let shared = vec![
            Channel::new("Stable", "https://a.test/s", "Shared"),
            Channel::new("Canary", "https://a.test/c", "shared"),
        ];
        assert!(matches!(
            ChannelRegistry::new(shared),
            Err(LauncherError::Config(_))
        ));
    }

    #[test]
    fn urls_join_without_double_slash() {
        let c = Channel::new("Stable", "https://a.test/stable/", "Stable");
        assert_eq!(c.version_url(), "https://a.test/stable/version.txt");
        assert_eq!(c.archive_url("SHOE"), "https://a.test/stable/SHOE.zip");
        assert_eq!(
            c.install_dir(Path::new("/opt/shoe")),
            Path::new("/opt/shoe").join("Stable")
        );
    }
}
