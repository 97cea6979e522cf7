//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::storage::compression::CompressionType;
use crate::storage::container::BSML_MAJOR;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Container and dataset tuning
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Chunks grow until they hold at least this many bytes
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Starting row count for the chunk size search
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: u32,

    #[serde(default)]
    pub compression: CompressionType,

    /// Breakpoints held per index cache before it is reset
    #[serde(default = "default_index_cache_capacity")]
    pub index_cache_capacity: usize,

    /// Highest container major version accepted by `open`
    #[serde(default = "default_supported_major")]
    pub supported_major: u32,
}

fn default_chunk_bytes() -> usize {
    128 * 1024 // 128 KB
}

fn default_chunk_rows() -> u32 {
    4096
}

fn default_index_cache_capacity() -> usize {
    4096
}

fn default_supported_major() -> u32 {
    BSML_MAJOR
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            chunk_rows: default_chunk_rows(),
            compression: CompressionType::default(),
            index_cache_capacity: default_index_cache_capacity(),
            supported_major: default_supported_major(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("bsml").join("config.toml")),
            Some(PathBuf::from("./bsml.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(bytes) = std::env::var("BSML_CHUNK_BYTES") {
            if let Ok(b) = bytes.parse() {
                self.store.chunk_bytes = b;
            }
        }
        if let Ok(compression) = std::env::var("BSML_COMPRESSION") {
            match compression.parse() {
                Ok(c) => self.store.compression = c,
                Err(e) => tracing::warn!("Ignoring BSML_COMPRESSION: {}", e),
            }
        }
        if let Ok(capacity) = std::env::var("BSML_INDEX_CACHE_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.store.index_cache_capacity = c;
            }
        }

        if let Ok(level) = std::env::var("BSML_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BSML_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# BioSignalML store configuration
#
# Environment variables override these settings:
# - BSML_CHUNK_BYTES
# - BSML_COMPRESSION
# - BSML_INDEX_CACHE_CAPACITY
# - BSML_LOG_LEVEL
# - BSML_LOG_FORMAT

[store]
# Target chunk size in bytes; chunk row counts double until reached
chunk_bytes = 131072

# Starting chunk row count
chunk_rows = 4096

# Chunk compression: none, lz4 or xor-lz4
compression = "lz4"

# Breakpoints kept per clock index cache
index_cache_capacity = 4096

# Highest container major version accepted when opening
supported_major = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = StoreConfig::default();

        assert_eq!(config.store.chunk_bytes, defaults.chunk_bytes);
        assert_eq!(config.store.chunk_rows, defaults.chunk_rows);
        assert_eq!(config.store.compression, CompressionType::Lz4);
        assert_eq!(config.store.supported_major, BSML_MAJOR);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bsml.toml");
        std::fs::write(&path, "[store]\ncompression = \"xor-lz4\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.compression, CompressionType::XorLz4);
        assert_eq!(config.store.chunk_bytes, 128 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bsml.toml");
        std::fs::write(&path, "[store\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bsml.toml"));
    }
}
