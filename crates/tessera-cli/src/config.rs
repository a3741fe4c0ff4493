//! CLI configuration management
//!
//! Handles loading and parsing of the `tessera.toml` configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_types::{ModelConfig, RendezvousConfig, Result, ServerConfig, TesseraError};
use tokio::fs;

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// JSON model parameters; overrides `[model]` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config_path: Option<PathBuf>,

    /// Model shape
    #[serde(default)]
    pub model: ModelConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rendezvous configuration
    #[serde(default)]
    pub rendezvous: RendezvousConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Simulated platform used by `bringup`
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON log lines
    pub json: bool,
}

/// Simulated hardware for dry runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated devices
    pub devices: usize,

    /// Memory per device in bytes
    pub memory_bytes: u64,

    /// Whether the alternate (pmx) format can be built
    pub supports_pmx: bool,

    /// Require model shards to exist under `server.model_dir`
    pub verify_artifacts: bool,
}

impl CliConfig {
    /// Load configuration from file, writing defaults if it does not exist
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let default_config = Self::default();
            let content = toml::to_string_pretty(&default_config).map_err(|e| {
                TesseraError::serialization(format!("Failed to serialize default config: {}", e))
            })?;

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|e| {
                    TesseraError::io(format!("Failed to create config directory: {}", e))
                })?;
            }

            fs::write(path, content).await.map_err(|e| {
                TesseraError::io(format!("Failed to write default config: {}", e))
            })?;

            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TesseraError::io(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| TesseraError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            TesseraError::serialization(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)
            .await
            .map_err(|e| TesseraError::io(format!("Failed to write config file: {}", e)))
    }

    /// Model parameters, read from `model_config_path` when set
    pub fn resolve_model(&self) -> Result<ModelConfig> {
        match &self.model_config_path {
            Some(path) => ModelConfig::from_json_file(path),
            None => Ok(self.model.clone()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.resolve_model()?.validate()?;
        self.server.validate()?;

        if self.simulation.devices == 0 {
            return Err(TesseraError::config("simulation.devices cannot be 0"));
        }
        if self.simulation.memory_bytes == 0 {
            return Err(TesseraError::config("simulation.memory_bytes cannot be 0"));
        }

        Ok(())
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model_config_path: None,
            model: ModelConfig::default(),
            server: ServerConfig::default(),
            rendezvous: RendezvousConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            devices: 2,
            memory_bytes: 16 * 1024 * 1024 * 1024,
            supports_pmx: false,
            verify_artifacts: false,
        }
    }
}
