//! Device and cache element types

use crate::{Result, TesseraError};
use serde::{Deserialize, Serialize};

/// Zero-based accelerator index; doubles as the tensor-parallel rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

impl DeviceId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// The device that computes the shared token budget
    pub fn is_leader(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Kind of a device context registered with a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceContextKind {
    /// Context bound to an accelerator; owns a command stream
    Accelerator,
    /// Host-side staging context
    Host,
}

impl std::fmt::Display for DeviceContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceContextKind::Accelerator => write!(f, "accelerator"),
            DeviceContextKind::Host => write!(f, "host"),
        }
    }
}

/// Element type of the KV cache, selected by `cache_quant_bit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheDataType {
    /// Unquantized half precision
    FP16,
    /// 8-bit integer with per-group fp16 scales
    INT8,
}

impl CacheDataType {
    /// Resolve the cache element type from a quantization bit width.
    ///
    /// Only 0 (unquantized) and 8 are recognized.
    pub fn from_quant_bit(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(CacheDataType::FP16),
            8 => Ok(CacheDataType::INT8),
            other => Err(TesseraError::config(format!(
                "unsupported cache quant bit: [{}]",
                other
            ))),
        }
    }

    /// Size in bytes of one cache element
    pub fn size_bytes(self) -> u64 {
        match self {
            CacheDataType::FP16 => 2,
            CacheDataType::INT8 => 1,
        }
    }

    pub fn is_quantized(self) -> bool {
        matches!(self, CacheDataType::INT8)
    }
}

/// Size in bytes of one quantization scale factor (fp16)
pub const SCALE_ELEMENT_BYTES: u64 = 2;

/// Device memory management policy handed to engines and device contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicy {
    /// Pack allocations tightly to leave the most room for the KV cache
    #[default]
    Compact,
    /// Favor allocation speed over footprint
    Performance,
}
