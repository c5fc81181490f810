//! Host configuration
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! name = "plughost"
//!
//! [tcp]
//! enabled = true
//! port = 22752
//! random = false
//!
//! [udp]
//! enabled = true
//! port = 22752
//!
//! [compat]
//! switch_plugins_first_slot = false
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Port both listeners use unless configured otherwise
pub const DEFAULT_PORT: u16 = 22752;

pub const DEFAULT_NAME: &str = "plughost";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Serialize(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Serialize(msg) => write!(f, "Config serialize error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings of one listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub enabled: bool,
    pub port: u16,
    /// Let the OS pick a free port
    pub random: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_PORT,
            random: false,
        }
    }
}

impl ListenerConfig {
    /// Port to bind, 0 when a random one was requested
    pub fn bind_port(&self) -> u16 {
        if self.random {
            0
        } else {
            self.port
        }
    }
}

/// Opt-in reproductions of legacy controller behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// `switch_plugins` takes both indices from its first argument
    pub switch_plugins_first_slot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root path segment plugin commands are addressed under
    pub name: String,
    pub tcp: ListenerConfig,
    pub udp: ListenerConfig,
    pub compat: CompatConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            tcp: ListenerConfig::default(),
            udp: ListenerConfig::default(),
            compat: CompatConfig::default(),
        }
    }
}

impl HostConfig {
    /// `<config dir>/plughost/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("plughost").join("config.toml"))
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: HostConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "name '{}' must not contain '/'",
                self.name
            )));
        }
        if !self.tcp.enabled && !self.udp.enabled {
            return Err(ConfigError::Invalid(
                "at least one of tcp and udp must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}
