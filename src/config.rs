//! Store options and their TOML representation.

use std::path::{Path, PathBuf};

#[cfg(feature = "config")]
use serde::Deserialize;

/// When committed writes reach stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(rename_all = "kebab-case"))]
pub enum Durability {
    /// fsync data and metadata before a write returns.
    #[default]
    Sync,
    /// fsync data only.
    SyncData,
    /// Leave flushing to the journal; a crash may lose the latest writes.
    Buffered,
}

impl Durability {
    pub(crate) fn persist_mode(self) -> fjall::PersistMode {
        match self {
            Durability::Sync => fjall::PersistMode::SyncAll,
            Durability::SyncData => fjall::PersistMode::SyncData,
            Durability::Buffered => fjall::PersistMode::Buffer,
        }
    }
}

/// Options for opening a [`crate::Db`].
///
/// ```toml
/// path = "/var/lib/chainkv"
/// create-if-missing = true
/// durability = "sync"
/// max-key-size = 4096
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(rename_all = "kebab-case", default))]
pub struct Options {
    /// Store directory.
    pub path: PathBuf,
    /// Initialize a fresh store when none exists at `path`.
    pub create_if_missing: bool,
    pub durability: Durability,
    /// Largest accepted user key, in bytes.
    pub max_key_size: usize,
}

impl Options {
    /// Keys are limited to `u16::MAX` bytes by the storage engine; map entries
    /// spend up to 256 of those on the map name prefix.
    pub const MAX_KEY_SIZE: usize = u16::MAX as usize - 256;

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size.min(Self::MAX_KEY_SIZE);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".chainkv"),
            create_if_missing: true,
            durability: Durability::default(),
            max_key_size: Self::MAX_KEY_SIZE,
        }
    }
}

#[cfg(feature = "config")]
impl Options {
    /// Load options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    /// Parse options from a TOML string. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut options: Options = toml::from_str(content).map_err(ConfigError::Parse)?;
        options.max_key_size = options.max_key_size.min(Self::MAX_KEY_SIZE);
        Ok(options)
    }
}

/// Configuration error.
#[cfg(feature = "config")]
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the options file.
    Io(String, std::io::Error),
    /// TOML parse error.
    Parse(toml::de::Error),
}

#[cfg(feature = "config")]
impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Failed to read options file '{}': {}", path, e),
            ConfigError::Parse(e) => write!(f, "Failed to parse options: {}", e),
        }
    }
}

#[cfg(feature = "config")]
impl std::error::Error for ConfigError {}
