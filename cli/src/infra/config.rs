//! Configuration file loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{AppConfig, ConfigError};

/// Environment variable overriding the control-plane token.
pub const TOKEN_ENV: &str = "MC_AUTO_API_TOKEN";

/// File names looked up in the working directory, in order.
const LOCAL_CANDIDATES: [&str; 2] = ["config.json", "config.yaml"];

/// Loads `AppConfig` from a YAML or JSON file on disk.
pub struct FileConfigStore {
    explicit: Option<PathBuf>,
}

impl FileConfigStore {
    /// `explicit` comes from `--config` / `MC_AUTO_CONFIG` and wins when set.
    #[must_use]
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// The file that [`load`](Self::load) reads.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when no candidate exists.
    pub fn path(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        resolve(self.explicit.as_deref(), &cwd, dirs::home_dir().as_deref())
    }

    /// Read, apply environment overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparseable or invalid.
    pub fn load(&self) -> Result<AppConfig> {
        let path = self.path()?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.api_token = token;
            }
        }
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Pick the configuration file: the explicit path, else the first existing
/// local candidate, else `~/.mc-auto/config.yaml`.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` naming every place looked at.
pub fn resolve(explicit: Option<&Path>, cwd: &Path, home: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::NotFound(path.display().to_string()).into());
    }

    let mut searched = Vec::new();
    let candidates = LOCAL_CANDIDATES
        .iter()
        .map(|name| cwd.join(name))
        .chain(home.map(|h| h.join(".mc-auto").join("config.yaml")));
    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate.display().to_string());
    }
    Err(ConfigError::NotFound(searched.join(", ")).into())
}
