//! Server configuration, loaded once at startup and passed to every
//! component that needs it. Nothing here is mutable after load.

use std::error::Error;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Public base URL of this server, without a trailing slash.
    pub server_url: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_help_path")]
    pub help_path: String,
}

fn default_database_path() -> String {
    "gemloom.db".to_string()
}

fn default_socket_path() -> String {
    "scgi.sock".to_string()
}

fn default_help_path() -> String {
    "help.gmi".to_string()
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Io(path.display().to_string(), err))?;
    let mut config: Config = toml::from_str(&text)?;
    config.server_url = config.server_url.trim_end_matches('/').to_string();
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("gemini://") {
            return Err(ConfigError::Invalid(format!(
                "server_url must be a gemini:// URL, got \"{}\"",
                self.server_url
            )));
        }
        if self.database_path.is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".to_string()));
        }
        if self.socket_path.is_empty() {
            return Err(ConfigError::Invalid("socket_path is empty".to_string()));
        }
        if self.help_path.is_empty() {
            return Err(ConfigError::Invalid("help_path is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String, std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => write!(f, "error reading {}: {}", path, err),
            ConfigError::Parse(err) => write!(f, "invalid configuration: {}", err),
            ConfigError::Invalid(detail) => write!(f, "invalid configuration: {}", detail),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(_, err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Parse(value)
    }
}
