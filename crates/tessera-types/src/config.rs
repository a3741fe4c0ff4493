//! Configuration types consumed by the bring-up layer
//!
//! These mirror the model and server parameters the serving process loads at
//! startup. The core never parses files itself except through the helpers
//! here, which exist for the CLI and tests.

use crate::{CacheDataType, Result, TesseraError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Model shape parameters relevant to KV cache sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of transformer layers
    pub num_layers: u32,
    /// Number of attention (query) heads
    pub num_heads: u32,
    /// Number of key/value heads (GQA/MQA aware)
    pub num_kv_heads: u32,
    /// Model hidden dimension
    pub hidden_dim: u32,
    /// KV cache quantization bit width: 0 (fp16) or 8 (int8)
    #[serde(default)]
    pub cache_quant_bit: u32,
    /// Elements sharing one scale factor when quantized
    #[serde(default)]
    pub cache_quant_group: u32,
}

impl ModelConfig {
    /// Load model parameters from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::io(format!(
                "failed to read model config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: ModelConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Cache element type implied by `cache_quant_bit`
    pub fn cache_data_type(&self) -> Result<CacheDataType> {
        CacheDataType::from_quant_bit(self.cache_quant_bit)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_layers == 0 {
            return Err(TesseraError::config("num_layers cannot be 0"));
        }
        if self.num_heads == 0 {
            return Err(TesseraError::config("num_heads cannot be 0"));
        }
        if self.num_kv_heads == 0 {
            return Err(TesseraError::config("num_kv_heads cannot be 0"));
        }
        if self.hidden_dim == 0 {
            return Err(TesseraError::config("hidden_dim cannot be 0"));
        }
        let dtype = self.cache_data_type()?;
        if dtype.is_quantized() && self.cache_quant_group == 0 {
            return Err(TesseraError::config(format!(
                "cache_quant_group must be > 0 when cache_quant_bit is {}",
                self.cache_quant_bit
            )));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        // LLaMA-2-7B shaped defaults
        Self {
            num_layers: 32,
            num_heads: 32,
            num_kv_heads: 32,
            hidden_dim: 4096,
            cache_quant_bit: 0,
            cache_quant_group: 0,
        }
    }
}

/// Quantization method applied by the compute engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantMethod {
    /// No weight/activation quantization
    None,
    /// Online int8 weights and int8 activations
    OnlineI8I8,
}

impl QuantMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantMethod::None => "none",
            QuantMethod::OnlineI8I8 => "online_i8i8",
        }
    }
}

impl FromStr for QuantMethod {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(QuantMethod::None),
            "online_i8i8" => Ok(QuantMethod::OnlineI8I8),
            other => Err(TesseraError::config(format!(
                "unknown/unsupported quant method: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for QuantMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk model artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFormat {
    /// Default format, `model.onnx`
    Onnx,
    /// Alternate format, `model.pmx`
    Pmx,
}

impl ModelFormat {
    /// File extension of the artifact
    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Onnx => "onnx",
            ModelFormat::Pmx => "pmx",
        }
    }
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serving process configuration relevant to bring-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `model_slice_<i>/` shards
    pub model_dir: PathBuf,
    /// Number of devices / workers (P)
    pub tensor_parallel_size: usize,
    /// Load the alternate (pmx) artifact instead of onnx
    #[serde(alias = "use_pmx")]
    pub use_alternate_model_format: bool,
    /// Engine quantization method, "none" or "online_i8i8"
    pub quant_method: String,
    /// Fraction of available device memory reserved for the KV cache
    pub max_tokens_scale: f32,
}

impl ServerConfig {
    /// Artifact format selected by `use_alternate_model_format`
    pub fn model_format(&self) -> ModelFormat {
        if self.use_alternate_model_format {
            ModelFormat::Pmx
        } else {
            ModelFormat::Onnx
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tensor_parallel_size == 0 {
            return Err(TesseraError::config("tensor_parallel_size cannot be 0"));
        }
        if !(self.max_tokens_scale > 0.0 && self.max_tokens_scale <= 1.0) {
            return Err(TesseraError::config(format!(
                "max_tokens_scale must be in (0, 1], got {}",
                self.max_tokens_scale
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./model"),
            tensor_parallel_size: 1,
            use_alternate_model_format: false,
            quant_method: QuantMethod::None.as_str().to_string(),
            max_tokens_scale: 0.8,
        }
    }
}

/// Rendezvous behavior for the allocation barrier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Give up waiting for peers after this many milliseconds
    pub timeout_ms: Option<u64>,
}

impl RendezvousConfig {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_ms.map(std::time::Duration::from_millis)
    }
}
