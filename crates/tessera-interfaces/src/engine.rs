//! Compute engine construction contracts

use crate::collective::Communicator;
use crate::memory::StreamHandle;
use crate::runtime::{DeviceContext, RuntimeBuilder};
use std::sync::Arc;
use tessera_types::{DeviceId, MemoryPolicy, ModelFormat, QuantMethod, Result};

/// Options for creating a device-bound compute engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Device the engine runs on
    pub device: DeviceId,
    /// Quantization method applied to weights/activations
    pub quant_method: QuantMethod,
    /// Memory management policy
    pub memory_policy: MemoryPolicy,
    /// Stream the engine's runtime issues work on
    pub stream: StreamHandle,
}

/// Post-construction engine configuration
#[derive(Clone)]
pub enum EngineOption {
    /// Attach this device's tensor-parallel communicator
    TensorParallelComm(Arc<dyn Communicator>),
}

impl std::fmt::Debug for EngineOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineOption::TensorParallelComm(comm) => f
                .debug_struct("TensorParallelComm")
                .field("rank", &comm.rank())
                .field("world_size", &comm.world_size())
                .finish(),
        }
    }
}

/// A compute engine bound to one device
pub trait Engine: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Device the engine is bound to
    fn device(&self) -> DeviceId;

    /// Apply a configuration option
    fn configure(&mut self, option: EngineOption) -> Result<()>;
}

/// Options for creating an accelerator device context
#[derive(Debug, Clone)]
pub struct DeviceContextOptions {
    pub device: DeviceId,
    pub stream: StreamHandle,
    pub memory_policy: MemoryPolicy,
}

/// Factory for engines, device contexts and runtime builders
pub trait ComputeProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Whether artifacts in `format` can be built
    fn supports_format(&self, format: ModelFormat) -> bool;

    /// Create an engine bound to `options.device`
    fn create_engine(&self, options: &EngineOptions) -> Result<Box<dyn Engine>>;

    /// Create an accelerator device context for input/output tensors
    fn create_device_context(
        &self,
        options: &DeviceContextOptions,
    ) -> Result<Arc<dyn DeviceContext>>;

    /// Create a host-side staging device context
    fn create_host_device_context(&self) -> Result<Arc<dyn DeviceContext>>;

    /// Create a runtime builder for `format`
    fn create_runtime_builder(&self, format: ModelFormat) -> Result<Box<dyn RuntimeBuilder>>;
}
