//! Per-device allocation statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_types::DeviceId;

/// Snapshot of a device's allocation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub device: DeviceId,
    /// Total bytes allocated (lifetime)
    pub total_allocated_bytes: u64,
    /// Total bytes freed (lifetime)
    pub total_freed_bytes: u64,
    pub current_usage_bytes: u64,
    pub peak_usage_bytes: u64,
    pub active_allocations: u64,
    pub allocation_count: u64,
    pub allocation_failures: u64,
}

/// Lock-free allocation counters for one device
#[derive(Debug)]
pub struct MemoryStatsTracker {
    device: DeviceId,
    total_allocated: AtomicU64,
    total_freed: AtomicU64,
    current_usage: AtomicU64,
    peak_usage: AtomicU64,
    active_allocations: AtomicU64,
    allocation_count: AtomicU64,
    allocation_failures: AtomicU64,
}

impl MemoryStatsTracker {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            total_allocated: AtomicU64::new(0),
            total_freed: AtomicU64::new(0),
            current_usage: AtomicU64::new(0),
            peak_usage: AtomicU64::new(0),
            active_allocations: AtomicU64::new(0),
            allocation_count: AtomicU64::new(0),
            allocation_failures: AtomicU64::new(0),
        }
    }

    pub fn record_allocation(&self, size: u64) {
        self.total_allocated.fetch_add(size, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.active_allocations.fetch_add(1, Ordering::Relaxed);
        let new_usage = self.current_usage.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_usage.fetch_max(new_usage, Ordering::Relaxed);
    }

    pub fn record_free(&self, size: u64) {
        self.total_freed.fetch_add(size, Ordering::Relaxed);
        self.active_allocations.fetch_sub(1, Ordering::Relaxed);
        self.current_usage.fetch_sub(size, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_usage(&self) -> u64 {
        self.current_usage.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            device: self.device,
            total_allocated_bytes: self.total_allocated.load(Ordering::Relaxed),
            total_freed_bytes: self.total_freed.load(Ordering::Relaxed),
            current_usage_bytes: self.current_usage.load(Ordering::Relaxed),
            peak_usage_bytes: self.peak_usage.load(Ordering::Relaxed),
            active_allocations: self.active_allocations.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
        }
    }
}
