//! Domain types and validators for mc-auto configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::checksum::ChecksumAlgorithm;
use crate::domain::error::ConfigError;
use crate::domain::retry::RetryPolicy;

/// Minecraft account names: 3–16 characters, letters, digits and underscore.
static PLAYER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // pattern is a compile-time constant
    Regex::new(r"^[A-Za-z0-9_]{3,16}$").expect("valid player name pattern")
});

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration, read from `config.json` / `config.yaml`.
///
/// The legacy upper-case `config.json` keys are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Control-plane API token.
    #[serde(alias = "DIGITAL_OCEAN_AUTH_TOKEN")]
    pub api_token: String,
    /// Local world directory to upload.
    #[serde(alias = "WORLD_FILE_DIRECTORY")]
    pub world_directory: PathBuf,
    /// Local add-ons (mods) directory, uploaded when present.
    pub addons_directory: AddonsDirectory,
    /// SSH key registered with the control plane, by id or fingerprint.
    #[serde(alias = "SSH_KEY_ID")]
    pub ssh_key_id: Option<SshKeyRef>,
    /// URL of the server installer artifact.
    #[serde(alias = "FABRIC_INSTALLER_URL")]
    pub installer_url: String,
    /// Player names written to the access-control file.
    #[serde(alias = "PLAYER_WHITELIST")]
    pub allow_list: Vec<String>,
    /// Control-plane base URL.
    pub api_base_url: ApiBaseUrl,
    pub instance: InstanceConfig,
    pub ssh: SshConfig,
    pub server: ServerConfig,
    pub transfer: TransferConfig,
    pub backup: BackupConfig,
    pub retry: RetryConfig,
}

/// Key reference accepted by the control plane: numeric id or fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SshKeyRef {
    Id(u64),
    Fingerprint(String),
}

impl std::fmt::Display for SshKeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Fingerprint(fp) => f.write_str(fp),
        }
    }
}

/// Add-ons directory, `mods` next to the working directory by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AddonsDirectory(pub PathBuf);

impl Default for AddonsDirectory {
    fn default() -> Self {
        Self(PathBuf::from("mods"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiBaseUrl(pub String);

impl Default for ApiBaseUrl {
    fn default() -> Self {
        Self("https://api.digitalocean.com".to_owned())
    }
}

/// Parameters of the instance create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    /// Seconds to wait after a rebuild before polling for connectivity.
    pub rebuild_settle_secs: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "mc-auto".to_owned(),
            region: "lon1".to_owned(),
            size: "s-4vcpu-8gb-amd".to_owned(),
            image: "ubuntu-20-04-x64".to_owned(),
            rebuild_settle_secs: 10,
        }
    }
}

/// SSH client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    /// Private key to authenticate with; the SSH agent/defaults when unset.
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Upper bound for a single remote command (package upgrades are slow).
    pub exec_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_owned(),
            identity_file: None,
            connect_timeout_secs: 10,
            exec_timeout_secs: 3600,
        }
    }
}

impl SshConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

/// Game-server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// JVM maximum heap, e.g. `6G`.
    pub memory: String,
    pub launch_jar: String,
    /// `server.properties` keys to override.
    pub properties: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            memory: "6G".to_owned(),
            launch_jar: "fabric-server-launch.jar".to_owned(),
            properties: BTreeMap::new(),
        }
    }
}

/// Payload archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub checksum: ChecksumAlgorithm,
    pub local_archive: PathBuf,
    pub remote_archive: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            checksum: ChecksumAlgorithm::Md5,
            local_archive: PathBuf::from("in.tar.gz"),
            remote_archive: "in.tar.gz".to_owned(),
        }
    }
}

/// Backup archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub remote_archive: String,
    /// Directory the downloaded backup is written to.
    pub local_directory: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            remote_archive: "out.tar.gz".to_owned(),
            local_directory: PathBuf::from("."),
        }
    }
}

/// Retry policies for each waiting loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Waiting for an address and a successful SSH connection.
    pub connect: RetryPolicy,
    /// Re-uploading after a checksum mismatch.
    pub transfer: RetryPolicy,
    /// Waiting for the archive tool before extraction succeeds.
    pub extract: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect: RetryPolicy::linear(Duration::from_secs(1)),
            transfer: RetryPolicy::immediate(),
            extract: RetryPolicy::fixed(Duration::from_secs(1)),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Check that every setting needed to provision is present and sane.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("api_token (DIGITAL_OCEAN_AUTH_TOKEN)").into());
        }
        if self.world_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("world_directory (WORLD_FILE_DIRECTORY)").into());
        }
        if self.ssh_key_id.is_none() {
            return Err(ConfigError::Missing("ssh_key_id (SSH_KEY_ID)").into());
        }
        validate_installer_url(&self.installer_url)?;
        for name in &self.allow_list {
            validate_player_name(name)?;
        }
        Ok(())
    }
}

/// Validates the installer URL: http(s) and ending in a `.jar` artifact.
///
/// # Errors
///
/// Returns an error if the URL is empty or malformed.
pub fn validate_installer_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(ConfigError::Missing("installer_url (FABRIC_INSTALLER_URL)").into());
    }
    let artifact = crate::domain::server::installer_artifact(url);
    if !(url.starts_with("https://") || url.starts_with("http://"))
        || !artifact.ends_with(".jar")
    {
        return Err(ConfigError::InvalidValue {
            key: "installer_url",
            value: url.to_owned(),
            hint: "Expected an http(s) URL to a .jar installer.".to_owned(),
        }
        .into());
    }
    Ok(())
}

/// Validates a player name for the allow-list.
///
/// # Errors
///
/// Returns an error if the name is not a valid account name.
pub fn validate_player_name(name: &str) -> Result<()> {
    if !PLAYER_NAME.is_match(name) {
        return Err(ConfigError::InvalidValue {
            key: "allow_list",
            value: name.to_owned(),
            hint: "Player names are 3-16 characters: letters, digits and '_'.".to_owned(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
