use thiserror::Error;
use std::{fmt, str::FromStr};

/// Three-part engine version as published in `version.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected MAJOR.MINOR.PATCH, got {0:?}")]
pub struct ParseVersionError(pub String);

impl Version {
    pub const ZERO: Version = Version::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Lenient parse: anything that is not exactly three integer fields
    /// collapses to [`Version::ZERO`]. Use `str::parse` to see the failure.
    pub fn parse(text: &str) -> Version {
        text.parse().unwrap_or(Version::ZERO)
    }

    pub fn has_changed(self, other: Version) -> bool {
        has_changed(self, other)
    }
}

/// True when any field differs. No ordering is implied.
pub fn has_changed(a: Version, b: Version) -> bool {
    a.major != b.major || a.minor != b.minor || a.patch != b.patch
}

/// Compares two version marker texts.
///
/// Well-formed texts are compared field-wise. If either side is malformed
/// the trimmed texts are compared instead, so an unparseable remote version
/// still counts as an update until it has been installed once.
pub fn stamps_differ(local: &str, remote: &str) -> bool {
    match (local.parse::<Version>(), remote.parse::<Version>()) {
        (Ok(a), Ok(b)) => has_changed(a, b),
        _ => local.trim() != remote.trim(),
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(text.to_string());
        let fields: Vec<&str> = text.trim().split('.').collect();
        if fields.len() != 3 {
            return Err(err());
        }
        let mut parsed = [0u32; 3];
        for (slot, field) in parsed.iter_mut().zip(&fields) {
            *slot = field.trim().parse().map_err(|_| err())?;
        }
        Ok(Version::new(parsed[0], parsed[1], parsed[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
