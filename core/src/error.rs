use std::fmt;
use std::path::PathBuf;

/// Failure of one oracle exchange. Fatal to the step that asked.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleError {
    /// Response text is not a JSON object of the delta shape
    Malformed { detail: String },
    /// Response parsed but breaks the protocol contract
    Contract { detail: String },
    /// Spawn failure, broken pipe or non-zero exit
    Transport { detail: String },
    Timeout { after_ms: u64 },
    ReplayExhausted { answered: usize },
}

impl OracleError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        OracleError::Malformed { detail: detail.into() }
    }

    pub fn contract(detail: impl Into<String>) -> Self {
        OracleError::Contract { detail: detail.into() }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        OracleError::Transport { detail: detail.into() }
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Malformed { detail } => write!(f, "malformed oracle response: {}", detail),
            OracleError::Contract { detail } => write!(f, "oracle response violates protocol: {}", detail),
            OracleError::Transport { detail } => write!(f, "oracle transport failed: {}", detail),
            OracleError::Timeout { after_ms } => write!(f, "oracle timed out after {}ms", after_ms),
            OracleError::ReplayExhausted { answered } => {
                write!(f, "replay oracle exhausted after {} responses", answered)
            }
        }
    }
}

impl std::error::Error for OracleError {}

/// Problems detected before the first step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownEntry { entry: String, available: Vec<String> },
    MissingCommand,
    MissingReplayFile,
    UnsupportedFormat { path: PathBuf },
    Invalid { path: PathBuf, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownEntry { entry, available } => {
                write!(f, "entry point '{}' not found in CFG", entry)?;
                if !available.is_empty() {
                    write!(f, " (available: {})", available.join(", "))?;
                }
                Ok(())
            }
            ConfigError::MissingCommand => write!(f, "command oracle requires a non-empty `command`"),
            ConfigError::MissingReplayFile => write!(f, "replay oracle requires a `replay` file"),
            ConfigError::UnsupportedFormat { path } => {
                write!(f, "unsupported config format: {} (expected .toml, .yaml, .yml or .json)", path.display())
            }
            ConfigError::Invalid { path, detail } => write!(f, "invalid config {}: {}", path.display(), detail),
        }
    }
}

impl std::error::Error for ConfigError {}
