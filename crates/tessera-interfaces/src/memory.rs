//! Device primitives: binding, streams and raw device memory
//!
//! These are the opaque fallible operations the bring-up core builds its
//! scoped guards on. Nothing here tracks ownership; callers pair every
//! `create_stream` with `destroy_stream` and every `allocate` with `free`.

use serde::{Deserialize, Serialize};
use tessera_types::{DeviceId, Result};

/// Device memory primitives for one accelerator family
pub trait DeviceBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Number of visible devices
    fn device_count(&self) -> Result<usize>;

    /// Bind the calling thread to `device`
    fn bind_device(&self, device: DeviceId) -> Result<()>;

    /// Create a command stream on `device`
    fn create_stream(&self, device: DeviceId) -> Result<StreamHandle>;

    /// Destroy a stream created by `create_stream`
    fn destroy_stream(&self, stream: StreamHandle) -> Result<()>;

    /// Query free/total memory on `device`
    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo>;

    /// Allocate `bytes` of device memory on `device`
    fn allocate(&self, device: DeviceId, bytes: u64) -> Result<MemoryHandle>;

    /// Free memory returned by `allocate`
    fn free(&self, handle: MemoryHandle) -> Result<()>;
}

/// Memory handle representing allocated device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(pub u64);

impl MemoryHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Device command stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

impl StreamHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Memory information for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total memory on the device (bytes)
    pub total_bytes: u64,
    /// Memory currently available for allocation (bytes)
    pub free_bytes: u64,
}

impl MemoryInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Calculate memory utilization percentage
    pub fn utilization_percent(&self) -> f32 {
        if self.total_bytes > 0 {
            (self.used_bytes() as f32 / self.total_bytes as f32) * 100.0
        } else {
            0.0
        }
    }
}
