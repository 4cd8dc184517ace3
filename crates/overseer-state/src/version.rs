use overseer_core::OverseerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` state version.
///
/// Serialized as its dotted string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Bumped for breaking state changes.
    pub major: u32,
    /// Bumped for features.
    pub minor: u32,
    /// Bumped by default.
    pub patch: u32,
}

/// Which component of the version a snapshot bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Increment {
    /// `x+1.0.0`.
    Major,
    /// `x.y+1.0`.
    Minor,
    /// `x.y.z+1`.
    #[default]
    Patch,
}

impl Version {
    /// Version of a workspace with no snapshots yet.
    pub const INITIAL: Version = Version::new(1, 0, 0);

    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// The next version for `increment`; lower components reset to zero.
    pub fn bump(self, increment: Increment) -> Self {
        match increment {
            Increment::Major => Self::new(self.major + 1, 0, 0),
            Increment::Minor => Self::new(self.major, self.minor + 1, 0),
            Increment::Patch => Self::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = OverseerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let parts: Vec<&str> = trimmed.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(OverseerError::InvalidVersion(s.to_string()));
        };
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| OverseerError::InvalidVersion(s.to_string()))
        };
        Ok(Self::new(parse(*major)?, parse(*minor)?, parse(*patch)?))
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Increment {
    type Err = OverseerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(Increment::Major),
            "minor" => Ok(Increment::Minor),
            "patch" => Ok(Increment::Patch),
            other => Err(OverseerError::Config(format!(
                "Invalid increment '{other}' (expected major, minor or patch)"
            ))),
        }
    }
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Increment::Major => write!(f, "major"),
            Increment::Minor => write!(f, "minor"),
            Increment::Patch => write!(f, "patch"),
        }
    }
}
