use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::run::{DEFAULT_MAX_STEPS, RunOptions};

pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    #[default]
    Symbolic,
    Command,
    Replay,
}

impl OracleBackend {
    pub const ALL: [OracleBackend; 3] = [OracleBackend::Symbolic, OracleBackend::Command, OracleBackend::Replay];

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleBackend::Symbolic => "symbolic",
            OracleBackend::Command => "command",
            OracleBackend::Replay => "replay",
        }
    }
}

impl fmt::Display for OracleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OracleBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        OracleBackend::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown oracle backend '{}' (expected symbolic, command or replay)", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    /// Program and arguments of the `command` backend
    pub command: Vec<String>,
    pub timeout_ms: u64,
    /// Extra attempts after a failed exchange
    pub retries: u32,
    /// Response file of the `replay` backend, one JSON document per line
    pub replay: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            command: Vec::new(),
            timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
            retries: 0,
            replay: None,
        }
    }
}

/// Run parameters as read from a config file; CLI flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub entry: Option<String>,
    pub max_steps: usize,
    pub trace: bool,
    pub oracle: OracleConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
            trace: false,
            oracle: OracleConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads a config file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let invalid = |detail: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            detail,
        };
        let config: RunConfig = match ext.as_str() {
            "toml" => toml::from_str(text).map_err(|e| invalid(e.to_string()))?,
            "yaml" | "yml" => serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?,
            "json" => serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                }
                .into());
            }
        };
        tracing::debug!(target: "symir::config", path = %path.display(), ?config, "config loaded");
        Ok(config)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            entry: self.entry.clone(),
            max_steps: self.max_steps,
            trace: self.trace,
        }
    }
}
