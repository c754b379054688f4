//! Runtime configuration types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File picked up automatically from the directory of the script being run.
pub const CONFIG_FILE_NAME: &str = "sable.toml";

/// Runtime configuration for the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum number of live call frames
    pub max_frames: usize,
    /// Operand stack capacity of each frame
    pub stack_capacity: usize,
    /// Emit tracing events to stderr
    pub trace: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_frames: 256,
            stack_capacity: 256,
            trace: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl RuntimeConfig {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load `sable.toml` from the script's directory if there is one,
    /// defaults otherwise.
    pub fn discover(script: &Path) -> Result<Self, ConfigError> {
        let dir = script.parent().unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "loading runtime config");
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames == 0 {
            let message = "max_frames must be at least 1";
            return Err(ConfigError::Invalid(message.to_string()));
        }
        if self.stack_capacity == 0 {
            let message = "stack_capacity must be at least 1";
            return Err(ConfigError::Invalid(message.to_string()));
        }
        Ok(())
    }
}

/// Output format for `--timings`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimingsFormat {
    #[default]
    Human,
    Json,
}
