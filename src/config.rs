//! Uploader configuration: a TOML file plus environment overrides for secrets.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::utils::thumbnail::{DEFAULT_THUMBNAIL_ENDPOINT, DEFAULT_THUMBNAIL_TIMEOUT};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// Durations are written as whole seconds
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing setting {0}")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub uploader: UploaderConfig,
    pub lbry: LbryConfig,
    pub rumble: RumbleConfig,
    pub thumbnail: ThumbnailConfig,
    pub plugins: PluginConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UploaderConfig {
    pub verbose: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub destination_delay: Duration,
    /// Completed uploads are appended here, one JSON object per line
    pub record_file: PathBuf,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            destination_delay: Duration::from_secs(1),
            record_file: PathBuf::from("uploaded_vods.jsonl"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LbryConfig {
    pub enabled: bool,
    /// JSON-RPC endpoint of the local daemon
    pub uri: String,
    pub author: String,
    pub channel_name: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for LbryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: "http://localhost:5279".to_string(),
            author: String::new(),
            channel_name: String::new(),
            poll_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RumbleConfig {
    pub enabled: bool,
    pub login: String,
    pub password: String,
    pub base_url: String,
    /// `{server}` is replaced by the upload server the upload page assigns
    pub upload_server_template: String,
    pub cookie_file: PathBuf,
}

impl Default for RumbleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            login: String::new(),
            password: String::new(),
            base_url: "https://rumble.com".to_string(),
            upload_server_template: "https://{server}.rumble.com/upload.php".to_string(),
            cookie_file: PathBuf::from("cookiejar.json"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub endpoint: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_THUMBNAIL_ENDPOINT.to_string(),
            timeout: DEFAULT_THUMBNAIL_TIMEOUT,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PluginConfig {
    pub enabled: bool,
    /// Spawned as `<command> <event> <json>` for every lifecycle event
    pub command: String,
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads the file if it exists, otherwise starts from defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(verbose) = lookup("VERBOSE") {
            let verbose = verbose.to_lowercase();
            self.uploader.verbose = verbose == "1" || verbose == "true";
        }

        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.lbry.uri, "LBRY_URI");
        set(&mut self.lbry.author, "LBRY_AUTHOR");
        set(&mut self.lbry.channel_name, "LBRY_CHANNEL_NAME");
        set(&mut self.rumble.login, "RUMBLE_LOGIN");
        set(&mut self.rumble.password, "RUMBLE_PASSWORD");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lbry.enabled {
            if self.lbry.uri.is_empty() {
                return Err(ConfigError::Missing("lbry.uri"));
            }
            if self.lbry.author.is_empty() {
                return Err(ConfigError::Missing("lbry.author"));
            }
            if self.lbry.channel_name.is_empty() {
                return Err(ConfigError::Missing("lbry.channel_name"));
            }
        }
        if self.rumble.enabled {
            if self.rumble.login.is_empty() {
                return Err(ConfigError::Missing("rumble.login"));
            }
            if self.rumble.password.is_empty() {
                return Err(ConfigError::Missing("rumble.password"));
            }
        }
        if self.plugins.enabled && self.plugins.command.is_empty() {
            return Err(ConfigError::Missing("plugins.command"));
        }
        Ok(())
    }

    /// Enabled destination names, in dispatch order.
    pub fn enabled_destinations(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.lbry.enabled {
            names.push("lbry".to_string());
        }
        if self.rumble.enabled {
            names.push("rumble".to_string());
        }
        names
    }
}
