//! Collaborator interfaces for the tessera bring-up layer
//!
//! The bring-up core never talks to a driver, an inference engine or a
//! collective library directly. Everything it needs from the outside world
//! is expressed as a trait in this crate:
//!
//! - [`DeviceBackend`]: device binding, streams, memory query and raw allocation
//! - [`ComputeProvider`]: engines, device contexts and runtime builders
//! - [`CollectiveProvider`]: communicator group construction
//! - [`SamplerFactory`]: sampler construction bound to a device stream
//!
//! Implementations are plugged in by the serving process (real hardware) or
//! by `tessera-runtime`'s simulated platform (tests and dry runs).

pub mod collective;
pub mod engine;
pub mod memory;
pub mod runtime;
pub mod sampler;

pub use collective::{CollectiveProvider, Communicator};
pub use engine::{ComputeProvider, DeviceContextOptions, Engine, EngineOption, EngineOptions};
pub use memory::{DeviceBackend, MemoryHandle, MemoryInfo, StreamHandle};
pub use runtime::{BuildResources, DeviceContext, Runtime, RuntimeBuilder};
pub use sampler::{DeviceSampler, SamplerFactory};

pub use tessera_types::{
    DeviceContextKind, DeviceId, MemoryPolicy, ModelFormat, QuantMethod, Result, TesseraError,
};
