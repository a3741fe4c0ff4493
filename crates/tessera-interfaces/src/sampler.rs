//! Sampler construction bound to a device stream

use crate::memory::StreamHandle;
use tessera_types::Result;

/// Token sampler that issues its work on one device stream
pub trait DeviceSampler: Send + Sync {
    fn name(&self) -> &str;

    /// Stream the sampler is bound to
    fn stream(&self) -> StreamHandle;
}

/// Creates samplers for a given stream
pub trait SamplerFactory: Send + Sync {
    fn create_sampler(&self, stream: StreamHandle) -> Result<Box<dyn DeviceSampler>>;
}
