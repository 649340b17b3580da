//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FACES_ROOT_FOLDER";

/// Environment variable enabling learning mode
pub const LEARNING_ENV: &str = "LEARNING";

/// Name of the hash table file inside the root folder
pub const DEFAULT_DATA_FILE: &str = "data.json";

/// Same bound the quiz pages use for their normal waits
pub const DEFAULT_CORRELATION_TIMEOUT_MS: u64 = 20_000;

/// Identity hash algorithm used for quiz photos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 of the raw image bytes
    #[default]
    Sha256,
    /// 64-bit perceptual average hash of the decoded image
    Average,
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "average" | "ahash" => Ok(HashAlgorithm::Average),
            other => Err(Error::InvalidInput(format!(
                "unknown hash algorithm '{}' (expected sha256 or average)",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Average => write!(f, "average"),
        }
    }
}

/// `[logging]` section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[player]` section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How long a question waits for its photo to be hashed
    pub correlation_timeout_ms: u64,
    pub hash_algorithm: HashAlgorithm,
    /// Hash table file; relative paths are resolved against the root folder
    pub data_file: Option<PathBuf>,
    /// Keep replaying games to grow the hash table
    pub learning: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            correlation_timeout_ms: DEFAULT_CORRELATION_TIMEOUT_MS,
            hash_algorithm: HashAlgorithm::default(),
            data_file: None,
            learning: false,
        }
    }
}

impl PlayerConfig {
    pub fn correlation_timeout(&self) -> Duration {
        Duration::from_millis(self.correlation_timeout_ms)
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Platform location of `config.toml` (`~/.config/faces/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("faces").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Serialize a config to disk, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `FACES_ROOT_FOLDER` environment variable
/// 3. `root_folder` from the TOML config
/// 4. OS-dependent default (fallback)
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: toml_config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("faces"))
        .unwrap_or_else(|| PathBuf::from("./faces_data"))
}

/// Creates the root folder and derives file locations inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            debug!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }

    /// Hash table location; an absolute `data_file` is used as is
    pub fn data_file_path(&self, player: &PlayerConfig) -> PathBuf {
        match &player.data_file {
            Some(file) => self.root_folder.join(file),
            None => self.root_folder.join(DEFAULT_DATA_FILE),
        }
    }
}

/// Login details for the quiz site
#[derive(Clone, PartialEq, Eq)]
pub struct QuizCredentials {
    pub url: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for QuizCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizCredentials")
            .field("url", &self.url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl QuizCredentials {
    /// Read `URL`, `EMAIL` and `PASSWORD` from the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str, what: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("No {} provided (set {})", what, key)))
        };

        Ok(Self {
            url: require("URL", "start url")?,
            email: require("EMAIL", "username")?,
            password: require("PASSWORD", "password")?,
        })
    }
}

/// Learning mode from the `LEARNING` environment variable
pub fn learning_from_env() -> bool {
    parse_flag(std::env::var(LEARNING_ENV).ok().as_deref())
}

fn parse_flag(value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => false,
        Some(v) => !(v.is_empty() || v == "0" || v == "false" || v == "no"),
    }
}
