use overseer_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contents of `overseer.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct OverseerConfig {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Snapshots kept by `snapshot prune` when `--keep` is not given.
    #[serde(default = "default_keep_snapshots")]
    pub keep_snapshots: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            keep_snapshots: default_keep_snapshots(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            orchestrator: OrchestratorConfig::default(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./overseer-data")
}
fn default_keep_snapshots() -> usize {
    50
}

impl OverseerConfig {
    /// Parse `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }
}
