//! Configuration management for the update agent.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`UPDATE_AGENT__<SECTION>__<KEY>`). Everything the engine needs from its
//! environment, including the paths used for self-exclusion, is resolved here
//! once and passed into the orchestrator explicitly.

use crate::diff::SelfIdentity;
use crate::utils::errors::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "UPDATE_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub updater: UpdaterConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Master switch; a disabled updater never leaves `Idle`
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Application name, used in logs and prompts
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Manifest location: http(s) URL, file:// URL or filesystem path
    #[serde(default)]
    pub manifest_url: String,

    /// Root directory the manifest's relative paths are resolved against
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Root used to locate `.old` backups during rollback (defaults to `install_root`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_bin_root: Option<PathBuf>,

    /// Path of the host executable (defaults to the running executable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_exe: Option<PathBuf>,

    /// Path of the updater's own binary (defaults to the running executable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updater_binary: Option<PathBuf>,

    /// Where the session journal lives (defaults to `<install_root>/.update-agent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent file downloads
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Whole-request timeout per file, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Staging folder; relative paths are resolved against the install root
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Which applied files make a relaunch necessary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartScope {
    /// Any applied file
    #[default]
    Any,
    /// Only files whose extension is listed in `binary_extensions`
    Binaries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default)]
    pub scope: RestartScope,

    #[serde(default = "default_binary_extensions")]
    pub binary_extensions: Vec<String>,

    /// Command used to relaunch the host application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_enabled() -> bool {
    true
}

fn default_app_name() -> String {
    "application".to_string()
}

fn default_install_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(".update-staging")
}

fn default_user_agent() -> String {
    format!("update-agent/{}", env!("CARGO_PKG_VERSION"))
}

fn default_binary_extensions() -> Vec<String> {
    ["exe", "dll", "so", "dylib"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            app_name: default_app_name(),
            manifest_url: String::new(),
            install_root: default_install_root(),
            system_bin_root: None,
            current_exe: None,
            updater_binary: None,
            data_dir: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            staging_dir: default_staging_dir(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            scope: RestartScope::default(),
            binary_extensions: default_binary_extensions(),
            command: None,
            args: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl UpdaterConfig {
    pub fn system_bin_root(&self) -> PathBuf {
        self.system_bin_root
            .clone()
            .unwrap_or_else(|| self.install_root.clone())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join(".update-agent"))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir().join("last-session.json")
    }

    /// Resolve the running executable and updater binary paths.
    pub fn self_identity(&self) -> Result<SelfIdentity> {
        let running = || {
            std::env::current_exe()
                .map_err(|e| UpdateError::Config(format!("cannot resolve running executable: {e}")))
        };
        let current_exe = match &self.current_exe {
            Some(path) => path.clone(),
            None => running()?,
        };
        let updater_binary = match &self.updater_binary {
            Some(path) => path.clone(),
            None => running()?,
        };
        Ok(SelfIdentity::new(current_exe, updater_binary))
    }
}

impl DownloadConfig {
    pub fn staging_root(&self, install_root: &Path) -> PathBuf {
        if self.staging_dir.is_absolute() {
            self.staging_dir.clone()
        } else {
            install_root.join(&self.staging_dir)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl RestartConfig {
    /// Whether applying `relative_path` requires relaunching the host.
    pub fn requires_restart(&self, relative_path: &str) -> bool {
        match self.scope {
            RestartScope::Any => true,
            RestartScope::Binaries => Path::new(relative_path)
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| {
                    self.binary_extensions
                        .iter()
                        .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(&ext))
                }),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| UpdateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| UpdateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.updater.enabled && self.updater.manifest_url.trim().is_empty() {
            return Err(UpdateError::Config(
                "updater.manifest_url must be set when the updater is enabled".to_string(),
            ));
        }
        if self.download.max_concurrent == 0 {
            return Err(UpdateError::Config(
                "download.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
