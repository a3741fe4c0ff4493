//! # Tessera Engine
//!
//! Device bring-up and KV cache capacity planning for tensor-parallel
//! inference.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ResourceManager                        │
//! │  - block byte costs (CapacityPlanner)                     │
//! │  - communicator group, worker pool, rendezvous barrier    │
//! │  - sampler bound to device 0's stream                     │
//! └──────────────────────────────────────────────────────────┘
//!                              │ one task per device
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ DeviceInitTask 0│ │ DeviceInitTask 1│ │ DeviceInitTask N│
//! │ (budget leader) │ │                 │ │                 │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! Device 0 measures free memory after its runtime is built and publishes
//! the global token budget; every device then passes one rendezvous and
//! allocates `max_tokens × block_bytes` of cache.

pub mod artifact;
pub mod init_task;
pub mod planner;
pub mod platform;
pub mod resource_manager;
pub mod sampler_binding;

pub use artifact::{model_artifact_path, model_shard_dir};
pub use init_task::{
    DeviceInitTask, DeviceResource, DeviceRuntimeState, InitShared, InitStage, InitializedDevice,
};
pub use planner::{BlockBytes, CapacityPlanner, TokenBudget};
pub use platform::Platform;
pub use resource_manager::{BringupSummary, DeviceSummary, ResourceManager};
pub use sampler_binding::{bind_sampler, find_device_context};

pub use tessera_types::{ModelConfig, Result, ServerConfig, TesseraError};
