//! Binds the token sampler to the primary device's stream

use std::sync::Arc;
use tessera_interfaces::{DeviceContext, DeviceSampler, Runtime, SamplerFactory};
use tessera_types::{DeviceContextKind, Result, TesseraError};
use tracing::debug;

/// First device context of `kind` registered with `runtime`
pub fn find_device_context(
    runtime: &dyn Runtime,
    kind: DeviceContextKind,
) -> Option<Arc<dyn DeviceContext>> {
    runtime
        .device_contexts()
        .into_iter()
        .find(|ctx| ctx.kind() == kind)
}

/// Create a sampler on the stream of `runtime`'s accelerator context
pub fn bind_sampler(
    runtime: &dyn Runtime,
    factory: &dyn SamplerFactory,
) -> Result<Box<dyn DeviceSampler>> {
    let ctx = find_device_context(runtime, DeviceContextKind::Accelerator).ok_or_else(|| {
        TesseraError::orchestration("no accelerator device context registered with the runtime")
    })?;
    let stream = ctx.stream().map_err(|e| {
        TesseraError::orchestration(format!("failed to query accelerator stream: {}", e))
    })?;
    debug!(stream = stream.id(), "binding sampler");
    factory.create_sampler(stream).map_err(|e| {
        TesseraError::orchestration(format!(
            "failed to create sampler on stream {}: {}",
            stream.id(),
            e
        ))
    })
}
