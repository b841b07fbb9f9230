//! Runtime configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// JIT translation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Maximum guest instructions translated into one block
    pub max_block_instructions: u32,
    /// End the block as soon as an instruction leaves a pending exception
    pub exit_on_exception: bool,
    /// Log the host IR of every translated block at debug level
    pub dump_ir: bool,
    /// Host operation budget per block execution (0 disables the check)
    pub step_limit: u64,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            max_block_instructions: 256,
            exit_on_exception: true,
            dump_ir: false,
            step_limit: 1 << 24,
        }
    }
}

/// Guest memory settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Size of guest RAM in bytes
    pub ram_size: u64,
    /// Guest address where the code image is loaded
    pub load_address: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ram_size: 32 * 1024 * 1024,
            load_address: 0x1_0000,
        }
    }
}

/// Debug and logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("xenon-jit.log"),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub jit: JitConfig,
    pub memory: MemoryConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("xenon-jit").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the config from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path()?)
    }

    /// Load the config from a TOML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse a config from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config to a TOML file, creating parent directories
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_toml()?;
        let io_err = |source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, text).map_err(io_err)
    }
}
