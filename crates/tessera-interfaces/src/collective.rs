//! Collective communication group construction
//!
//! Only the construction contract is used here: initialize a group of size
//! P and get back P opaque communicators, ordered by rank.

use std::sync::Arc;
use tessera_types::{DeviceId, Result};

/// One rank's handle into a communicator group
pub trait Communicator: Send + Sync {
    /// This communicator's rank (0-based)
    fn rank(&self) -> usize;

    /// Total number of ranks in the group
    fn world_size(&self) -> usize;

    /// Device this communicator was created on
    fn device(&self) -> DeviceId;
}

/// Collective library entry point
pub trait CollectiveProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Create one communicator per device, all in the same group.
    ///
    /// The returned vector is ordered like `devices`.
    fn init_group(&self, devices: &[DeviceId]) -> Result<Vec<Arc<dyn Communicator>>>;
}
