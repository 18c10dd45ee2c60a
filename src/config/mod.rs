pub mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::tracks::ArgStyle;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External engine settings
    pub engine: EngineConfig,
    /// Default output naming
    pub output: OutputConfig,
    /// Directory import filtering
    pub import: ImportConfig,
}

impl AppConfig {
    /// Load configuration from TOML file, or create default if not found
    pub fn load() -> Self {
        let config_path = Self::config_path();

        if config_path.exists() {
            match Self::load_from_file(&config_path) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config: {}. Using defaults.", e);
                    return Self::default();
                }
            }
        }

        let config = Self::default();
        // Save default config for future editing
        if let Err(e) = config.save() {
            warn!("Failed to save default config: {}", e);
        }
        config
    }

    /// Save configuration to TOML file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_file(&Self::config_path())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Io(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Load and validate configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read config file: {}", e)))?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trackmix")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ffmpeg path must not be empty".to_string()));
        }
        if self.engine.ffprobe_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ffprobe path must not be empty".to_string()));
        }
        if self.output.container.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "output container extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Argument rendering quirks for the configured engine
    pub fn arg_style(&self) -> ArgStyle {
        ArgStyle {
            pad_spaced_values: self.engine.pad_spaced_metadata,
        }
    }

    /// Default output path next to `input`: `<stem><suffix>.<container>`
    pub fn default_output(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let name = format!("{}{}.{}", stem, self.output.suffix, self.output.container);
        input.with_file_name(name)
    }
}
