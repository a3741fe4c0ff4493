//! # Tessera Runtime
//!
//! Concurrency glue and resource ownership for device bring-up:
//!
//! - [`RendezvousBarrier`]: cyclic barrier that can be poisoned by a failing
//!   participant and optionally times out
//! - [`DeviceWorkerPool`]: fixed-size pool with exactly one worker per device
//! - [`OwnedStream`] / [`DeviceBuffer`]: release-on-drop guards over the
//!   device primitives
//! - [`SimulatedPlatform`]: in-process implementation of every collaborator
//!   contract with allocation tracking and fault injection

pub use tessera_interfaces::{DeviceBackend, MemoryHandle, StreamHandle};
pub use tessera_types::{DeviceId, Result, TesseraError};

pub mod backends;
pub mod barrier;
pub mod memory;
pub mod pool;

pub use backends::*;
pub use barrier::RendezvousBarrier;
pub use memory::*;
pub use pool::DeviceWorkerPool;
