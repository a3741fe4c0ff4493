//! Release-on-drop guards over device streams and memory
//!
//! Every stream and allocation acquired during bring-up is held by one of
//! these guards until it is published into long-lived state. Any early
//! return on a failure path therefore releases it.

use std::sync::Arc;
use tessera_interfaces::{DeviceBackend, MemoryHandle, StreamHandle};
use tessera_types::{DeviceId, Result};
use tracing::{debug, warn};

/// A device command stream destroyed when dropped
pub struct OwnedStream {
    backend: Arc<dyn DeviceBackend>,
    device: DeviceId,
    handle: StreamHandle,
}

impl OwnedStream {
    /// Create a stream on `device`
    pub fn create(backend: Arc<dyn DeviceBackend>, device: DeviceId) -> Result<Self> {
        let handle = backend.create_stream(device)?;
        debug!(device = device.index(), stream = handle.id(), "stream created");
        Ok(Self {
            backend,
            device,
            handle,
        })
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }
}

impl Drop for OwnedStream {
    fn drop(&mut self) {
        if let Err(e) = self.backend.destroy_stream(self.handle) {
            warn!(
                device = self.device.index(),
                stream = self.handle.id(),
                "failed to destroy stream: {}",
                e
            );
        } else {
            debug!(device = self.device.index(), stream = self.handle.id(), "stream destroyed");
        }
    }
}

impl std::fmt::Debug for OwnedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedStream")
            .field("device", &self.device)
            .field("handle", &self.handle)
            .finish()
    }
}

/// A device memory region freed when dropped
pub struct DeviceBuffer {
    backend: Arc<dyn DeviceBackend>,
    device: DeviceId,
    handle: MemoryHandle,
    size_bytes: u64,
}

impl DeviceBuffer {
    /// Allocate `size_bytes` on `device`
    pub fn allocate(
        backend: Arc<dyn DeviceBackend>,
        device: DeviceId,
        size_bytes: u64,
    ) -> Result<Self> {
        let handle = backend.allocate(device, size_bytes)?;
        debug!(device = device.index(), bytes = size_bytes, "device buffer allocated");
        Ok(Self {
            backend,
            device,
            handle,
            size_bytes,
        })
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.backend.free(self.handle) {
            warn!(
                device = self.device.index(),
                bytes = self.size_bytes,
                "failed to free device buffer: {}",
                e
            );
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device)
            .field("handle", &self.handle)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}
