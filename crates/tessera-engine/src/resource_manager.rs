//! Top-level bring-up orchestration
//!
//! [`ResourceManager::init`] validates configuration, sizes the per-token
//! cache cost, creates the communicator group, runs one
//! [`DeviceInitTask`] per device and binds the sampler. It succeeds only if
//! every device reaches `Ready`; otherwise everything acquired is released
//! and the root-cause error is returned.

use crate::init_task::{
    DeviceInitTask, DeviceResource, DeviceRuntimeState, InitShared, InitializedDevice,
};
use crate::planner::{BlockBytes, CapacityPlanner, TokenBudget};
use crate::platform::Platform;
use crate::sampler_binding::bind_sampler;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_interfaces::{Communicator, DeviceSampler};
use tessera_runtime::{DeviceWorkerPool, RendezvousBarrier};
use tessera_types::{
    DeviceId, MemoryPolicy, ModelConfig, RendezvousConfig, Result, ServerConfig, TesseraError,
};
use tracing::{debug, info, warn};

/// Per-device outcome of a successful bring-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device: DeviceId,
    pub cache_bytes: u64,
    pub scale_bytes: u64,
    pub runtime_inputs: usize,
    pub runtime_outputs: usize,
}

/// Outcome of a successful bring-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BringupSummary {
    pub block_bytes: BlockBytes,
    pub budget: TokenBudget,
    pub devices: Vec<DeviceSummary>,
}

/// Owns every per-device resource for the life of the process
pub struct ResourceManager {
    platform: Platform,
    rendezvous: RendezvousConfig,
    memory_policy: MemoryPolicy,
    init_attempted: bool,

    // Declaration order is drop order: sampler first, communicators last.
    sampler: Option<Box<dyn DeviceSampler>>,
    resources: Vec<DeviceResource>,
    runtime_states: Vec<DeviceRuntimeState>,
    communicators: Vec<Arc<dyn Communicator>>,
    budget: OnceCell<TokenBudget>,
    block_bytes: Option<BlockBytes>,
}

impl ResourceManager {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            rendezvous: RendezvousConfig::default(),
            memory_policy: MemoryPolicy::default(),
            init_attempted: false,
            sampler: None,
            resources: Vec::new(),
            runtime_states: Vec::new(),
            communicators: Vec::new(),
            budget: OnceCell::new(),
            block_bytes: None,
        }
    }

    pub fn with_rendezvous(mut self, rendezvous: RendezvousConfig) -> Self {
        self.rendezvous = rendezvous;
        self
    }

    pub fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    /// Bring up every device. May be called once per manager.
    pub fn init(&mut self, model: &ModelConfig, server: &ServerConfig) -> Result<()> {
        if self.init_attempted {
            return Err(TesseraError::invalid_state(
                "resource manager already initialized",
            ));
        }
        self.init_attempted = true;

        server.validate()?;
        let tp = server.tensor_parallel_size;
        let block_bytes = CapacityPlanner::compute_block_bytes(model, tp)?;
        info!(
            tensor_parallel_size = tp,
            cache_block_bytes = block_bytes.cache_block_bytes,
            scale_block_bytes = block_bytes.scale_block_bytes,
            "starting device bring-up"
        );

        let format = server.model_format();
        if !self.platform.compute.supports_format(format) {
            return Err(TesseraError::unsupported(format!(
                "model format '{}' is not available on compute provider '{}'",
                format,
                self.platform.compute.name()
            )));
        }

        let visible = self.platform.backend.device_count()?;
        if tp > visible {
            return Err(TesseraError::config(format!(
                "tensor_parallel_size {} exceeds the {} visible devices",
                tp, visible
            )));
        }

        let devices: Vec<DeviceId> = (0..tp).map(DeviceId).collect();
        let communicators = self.init_communicators(&devices)?;

        let pool = DeviceWorkerPool::new(tp)?;
        let barrier = RendezvousBarrier::with_timeout(tp, self.rendezvous.timeout());

        let results = {
            let shared = InitShared {
                platform: &self.platform,
                model_dir: &server.model_dir,
                format,
                quant_method: &server.quant_method,
                memory_policy: self.memory_policy,
                block_bytes,
                max_tokens_scale: server.max_tokens_scale,
                communicators: &communicators,
                barrier: &barrier,
                budget: &self.budget,
            };
            pool.parallel_execute_with(
                |i| DeviceInitTask::new(DeviceId(i), &shared).run(),
                |i, message| barrier.poison(format!("device:{} panicked: {}", i, message)),
            )
        };
        let assembled = root_cause(results)
            .and_then(|initialized| assemble(&self.platform, initialized));
        let (sampler, runtime_states, resources) = match assembled {
            Ok(parts) => parts,
            Err(e) => {
                // The leader may have published before a peer failed
                self.budget.take();
                return Err(e);
            }
        };

        self.sampler = Some(sampler);
        self.resources = resources;
        self.runtime_states = runtime_states;
        self.communicators = communicators;
        self.block_bytes = Some(block_bytes);

        if let Some(budget) = self.budget.get() {
            info!(
                devices = tp,
                max_tokens = budget.max_tokens,
                "device bring-up complete"
            );
        }
        Ok(())
    }

    fn init_communicators(&self, devices: &[DeviceId]) -> Result<Vec<Arc<dyn Communicator>>> {
        if devices.len() <= 1 {
            return Ok(Vec::new());
        }
        let provider = self.platform.collective.as_ref().ok_or_else(|| {
            TesseraError::config(format!(
                "tensor_parallel_size {} requires a collective communication provider",
                devices.len()
            ))
        })?;

        let comms = provider
            .init_group(devices)
            .map_err(|e| e.context("communicator group init"))?;
        if comms.len() != devices.len() {
            return Err(TesseraError::collective(format!(
                "collective provider '{}' returned {} communicators for {} devices",
                provider.name(),
                comms.len(),
                devices.len()
            )));
        }
        debug!(world_size = comms.len(), provider = provider.name(), "communicator group ready");
        Ok(comms)
    }

    pub fn is_initialized(&self) -> bool {
        self.sampler.is_some()
    }

    pub fn device_count(&self) -> usize {
        self.resources.len()
    }

    pub fn token_budget(&self) -> Option<&TokenBudget> {
        self.budget.get()
    }

    pub fn block_bytes(&self) -> Option<BlockBytes> {
        self.block_bytes
    }

    pub fn communicators(&self) -> &[Arc<dyn Communicator>] {
        &self.communicators
    }

    pub fn runtime_states(&self) -> &[DeviceRuntimeState] {
        &self.runtime_states
    }

    pub fn resources(&self) -> &[DeviceResource] {
        &self.resources
    }

    pub fn resource(&self, device: DeviceId) -> Option<&DeviceResource> {
        self.resources.get(device.index())
    }

    pub fn sampler(&self) -> Option<&dyn DeviceSampler> {
        self.sampler.as_deref()
    }

    /// Sizes of everything brought up, `None` before a successful init
    pub fn summary(&self) -> Option<BringupSummary> {
        let budget = *self.budget.get()?;
        let block_bytes = self.block_bytes?;
        if !self.is_initialized() {
            return None;
        }
        let devices = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| DeviceSummary {
                device: DeviceId(i),
                cache_bytes: r.cache_memory.size_bytes(),
                scale_bytes: r.scale_memory.as_ref().map_or(0, |s| s.size_bytes()),
                runtime_inputs: r.runtime.input_count(),
                runtime_outputs: r.runtime.output_count(),
            })
            .collect();
        Some(BringupSummary {
            block_bytes,
            budget,
            devices,
        })
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("platform", &self.platform)
            .field("devices", &self.resources.len())
            .field("budget", &self.budget.get())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

type Assembled = (
    Box<dyn DeviceSampler>,
    Vec<DeviceRuntimeState>,
    Vec<DeviceResource>,
);

/// Split per-device results into index-ordered slots and bind the sampler
/// to device 0. On error everything in `initialized` is dropped.
fn assemble(platform: &Platform, initialized: Vec<InitializedDevice>) -> Result<Assembled> {
    let (runtime_states, resources): (Vec<_>, Vec<_>) = initialized
        .into_iter()
        .map(|d| (d.runtime_state, d.resource))
        .unzip();

    let primary = resources
        .first()
        .ok_or_else(|| TesseraError::internal("bring-up produced no devices"))?;
    let sampler = bind_sampler(primary.runtime.as_ref(), platform.sampler_factory.as_ref())?;
    Ok((sampler, runtime_states, resources))
}

/// All values, or the first error that is not a peer cancellation.
///
/// Values from devices that did succeed are dropped (and released) on error.
fn root_cause<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut root: Option<TesseraError> = None;
    let mut cancelled: Option<TesseraError> = None;

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) if e.is_cancellation() => {
                cancelled.get_or_insert(e);
            }
            Err(e) => {
                root.get_or_insert(e);
            }
        }
    }

    match root.or(cancelled) {
        Some(e) => {
            warn!(succeeded = values.len(), "device bring-up failed: {}", e);
            Err(e)
        }
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_prefers_real_failure() {
        let results: Vec<Result<u32>> = vec![
            Err(TesseraError::cancelled("peer failed")),
            Ok(1),
            Err(TesseraError::runtime_build("device:2 bad artifact")),
            Err(TesseraError::device("device:3 lost")),
        ];
        let err = root_cause(results).unwrap_err();
        assert!(matches!(err, TesseraError::RuntimeBuild { .. }));
    }

    #[test]
    fn test_root_cause_falls_back_to_cancellation() {
        let results: Vec<Result<u32>> = vec![Ok(0), Err(TesseraError::cancelled("x"))];
        assert!(root_cause(results).unwrap_err().is_cancellation());
    }

    #[test]
    fn test_root_cause_all_ok() {
        let results: Vec<Result<u32>> = vec![Ok(0), Ok(1), Ok(2)];
        assert_eq!(root_cause(results).unwrap(), vec![0, 1, 2]);
    }
}
