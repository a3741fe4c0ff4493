//! Runtime build and device context contracts

use crate::engine::Engine;
use crate::memory::StreamHandle;
use std::path::Path;
use std::sync::Arc;
use tessera_types::{DeviceContextKind, DeviceId, ModelFormat, Result};

/// Engines a runtime builder may schedule work on
#[derive(Clone, Default)]
pub struct BuildResources {
    pub engines: Vec<Arc<dyn Engine>>,
}

impl BuildResources {
    pub fn single(engine: Arc<dyn Engine>) -> Self {
        Self {
            engines: vec![engine],
        }
    }
}

/// Builds an executable runtime from one model artifact
///
/// The onnx pipeline loads the model before resources are attached; the pmx
/// pipeline needs resources while loading. Callers order
/// [`load_model`](Self::load_model) and [`set_resources`](Self::set_resources)
/// by [`format`](Self::format).
pub trait RuntimeBuilder: Send {
    /// Artifact format this builder understands
    fn format(&self) -> ModelFormat;

    /// Load and parse the artifact at `path`
    fn load_model(&mut self, path: &Path) -> Result<()>;

    /// Attach the engines the runtime will run on
    fn set_resources(&mut self, resources: BuildResources) -> Result<()>;

    /// Run graph preprocessing (fusion, memory planning)
    fn preprocess(&mut self) -> Result<()>;

    /// Produce the runtime
    fn create_runtime(self: Box<Self>) -> Result<Box<dyn Runtime>>;
}

/// An executable model runtime bound to one device
pub trait Runtime: Send + Sync {
    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    /// Place input tensor `index` on `ctx`
    fn bind_input(&mut self, index: usize, ctx: Arc<dyn DeviceContext>) -> Result<()>;

    /// Place output tensor `index` on `ctx`
    fn bind_output(&mut self, index: usize, ctx: Arc<dyn DeviceContext>) -> Result<()>;

    /// Device contexts registered with this runtime
    fn device_contexts(&self) -> Vec<Arc<dyn DeviceContext>>;
}

/// A place tensors can live, with an explicit kind tag
pub trait DeviceContext: Send + Sync {
    fn kind(&self) -> DeviceContextKind;

    /// Accelerator index, `None` for host contexts
    fn device(&self) -> Option<DeviceId>;

    /// Stream this context issues work on
    fn stream(&self) -> Result<StreamHandle>;
}
