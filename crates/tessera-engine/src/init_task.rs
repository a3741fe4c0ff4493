//! Per-device bring-up state machine
//!
//! One [`DeviceInitTask`] runs on each device worker. It walks the device
//! through engine creation, runtime build and I/O binding, meets its peers
//! at the rendezvous once device 0 has published the token budget, then
//! allocates its cache slice. Everything it acquires is held by a guard
//! until the final `Ready` step hands ownership back to the caller.

use crate::artifact::model_artifact_path;
use crate::planner::{BlockBytes, CapacityPlanner, TokenBudget};
use crate::platform::Platform;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tessera_interfaces::{
    BuildResources, Communicator, ComputeProvider, DeviceContext, DeviceContextOptions, Engine,
    EngineOption, EngineOptions, Runtime,
};
use tessera_runtime::{DeviceBuffer, OwnedStream, RendezvousBarrier};
use tessera_types::{DeviceId, MemoryPolicy, ModelFormat, QuantMethod, Result, TesseraError};
use tracing::{debug, error, info, info_span};

/// Bring-up progress of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InitStage {
    Pending,
    DeviceBound,
    EngineCreated,
    RuntimeBuilt,
    IODeviceBound,
    AwaitingBudget,
    BudgetKnown,
    Rendezvoused,
    CacheAllocated,
    Ready,
    Failed,
}

impl InitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitStage::Pending => "pending",
            InitStage::DeviceBound => "device_bound",
            InitStage::EngineCreated => "engine_created",
            InitStage::RuntimeBuilt => "runtime_built",
            InitStage::IODeviceBound => "io_device_bound",
            InitStage::AwaitingBudget => "awaiting_budget",
            InitStage::BudgetKnown => "budget_known",
            InitStage::Rendezvoused => "rendezvoused",
            InitStage::CacheAllocated => "cache_allocated",
            InitStage::Ready => "ready",
            InitStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InitStage::Ready | InitStage::Failed)
    }
}

impl std::fmt::Display for InitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State every device task reads; written only through `budget`
pub struct InitShared<'a> {
    pub platform: &'a Platform,
    pub model_dir: &'a Path,
    pub format: ModelFormat,
    pub quant_method: &'a str,
    pub memory_policy: MemoryPolicy,
    pub block_bytes: BlockBytes,
    pub max_tokens_scale: f32,
    /// One per device when tensor parallel, empty for a single device
    pub communicators: &'a [Arc<dyn Communicator>],
    pub barrier: &'a RendezvousBarrier,
    /// Set once by device 0 before the rendezvous
    pub budget: &'a OnceCell<TokenBudget>,
}

/// Execution state the manager keeps per device
pub struct DeviceRuntimeState {
    pub engine: Arc<dyn Engine>,
    pub io_device_context: Arc<dyn DeviceContext>,
    pub stream: OwnedStream,
}

/// Serving resources the manager keeps per device
pub struct DeviceResource {
    pub runtime: Box<dyn Runtime>,
    pub host_device_context: Arc<dyn DeviceContext>,
    pub cache_memory: DeviceBuffer,
    /// Absent when the cache is unquantized
    pub scale_memory: Option<DeviceBuffer>,
}

/// Everything one device produced
pub struct InitializedDevice {
    pub device: DeviceId,
    pub runtime_state: DeviceRuntimeState,
    pub resource: DeviceResource,
}

/// Brings up one device
pub struct DeviceInitTask<'a> {
    device: DeviceId,
    stage: InitStage,
    shared: &'a InitShared<'a>,
}

impl<'a> DeviceInitTask<'a> {
    pub fn new(device: DeviceId, shared: &'a InitShared<'a>) -> Self {
        Self {
            device,
            stage: InitStage::Pending,
            shared,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn stage(&self) -> InitStage {
        self.stage
    }

    /// Run to `Ready` or `Failed`.
    ///
    /// A failure before the rendezvous poisons the barrier so peers stop
    /// waiting for this device.
    pub fn run(mut self) -> Result<InitializedDevice> {
        let span = info_span!("device_init", device = self.device.index());
        let _enter = span.enter();

        match self.process() {
            Ok(initialized) => Ok(initialized),
            Err(e) => {
                let reached = self.stage;
                self.stage = InitStage::Failed;

                if reached < InitStage::Rendezvoused {
                    self.shared.barrier.poison(format!(
                        "{} failed after {}: {}",
                        self.device, reached, e
                    ));
                }
                if e.is_cancellation() {
                    debug!(stage = %reached, "device init cancelled by peer");
                    Err(e)
                } else {
                    error!(stage = %reached, "device init failed: {}", e);
                    Err(e.context(format!("{} (after {})", self.device, reached)))
                }
            }
        }
    }

    fn advance(&mut self, stage: InitStage) {
        debug!(from = %self.stage, to = %stage, "device init stage");
        self.stage = stage;
    }

    fn process(&mut self) -> Result<InitializedDevice> {
        let device = self.device;
        let shared = self.shared;
        let platform = shared.platform;

        platform.backend.bind_device(device)?;
        self.advance(InitStage::DeviceBound);

        let stream = OwnedStream::create(Arc::clone(&platform.backend), device)?;
        let engine = self.create_engine(&stream)?;
        self.advance(InitStage::EngineCreated);

        let artifact = model_artifact_path(shared.model_dir, device, shared.format);
        let mut runtime = build_runtime(
            platform.compute.as_ref(),
            shared.format,
            &artifact,
            Arc::clone(&engine),
        )?;
        self.advance(InitStage::RuntimeBuilt);

        let io_device_context = platform.compute.create_device_context(&DeviceContextOptions {
            device,
            stream: stream.handle(),
            memory_policy: shared.memory_policy,
        })?;
        let host_device_context = platform.compute.create_host_device_context()?;
        for i in 0..runtime.input_count() {
            runtime.bind_input(i, Arc::clone(&io_device_context))?;
        }
        for i in 0..runtime.output_count() {
            runtime.bind_output(i, Arc::clone(&io_device_context))?;
        }
        self.advance(InitStage::IODeviceBound);

        self.advance(InitStage::AwaitingBudget);
        if device.is_leader() {
            self.publish_budget()?;
            self.advance(InitStage::BudgetKnown);
        }

        shared.barrier.wait()?;
        let budget = shared.budget.get().copied().ok_or_else(|| {
            TesseraError::internal("token budget missing after rendezvous")
        })?;
        if !device.is_leader() {
            self.advance(InitStage::BudgetKnown);
        }
        self.advance(InitStage::Rendezvoused);

        let (cache_memory, scale_memory) = self.allocate_cache(&budget)?;
        self.advance(InitStage::CacheAllocated);

        self.advance(InitStage::Ready);
        Ok(InitializedDevice {
            device,
            runtime_state: DeviceRuntimeState {
                engine,
                io_device_context,
                stream,
            },
            resource: DeviceResource {
                runtime,
                host_device_context,
                cache_memory,
                scale_memory,
            },
        })
    }

    fn create_engine(&self, stream: &OwnedStream) -> Result<Arc<dyn Engine>> {
        let shared = self.shared;
        let quant_method: QuantMethod = shared.quant_method.parse()?;

        let mut engine = shared.platform.compute.create_engine(&EngineOptions {
            device: self.device,
            quant_method,
            memory_policy: shared.memory_policy,
            stream: stream.handle(),
        })?;

        if let Some(comm) = shared.communicators.get(self.device.index()) {
            engine.configure(EngineOption::TensorParallelComm(Arc::clone(comm)))?;
        }
        Ok(Arc::from(engine))
    }

    fn publish_budget(&self) -> Result<()> {
        let shared = self.shared;
        let info = shared.platform.backend.memory_info(self.device)?;
        let budget = CapacityPlanner::compute_token_budget(
            info.free_bytes,
            shared.block_bytes.cache_block_bytes,
            shared.block_bytes.scale_block_bytes,
            shared.max_tokens_scale,
        )?;

        info!(
            total_bytes = info.total_bytes,
            used_bytes = info.used_bytes(),
            utilization = %format!("{:.1}%", info.utilization_percent()),
            available_bytes = budget.available_bytes,
            cache_max_bytes = budget.cache_max_bytes,
            scale_max_bytes = budget.scale_max_bytes,
            max_tokens = budget.max_tokens,
            "token budget computed"
        );

        if budget.max_tokens == 0 {
            return Err(TesseraError::out_of_memory(format!(
                "no room for a single token: {} of {} available bytes reserved, {} bytes per token",
                budget.reserved_bytes,
                budget.available_bytes,
                shared.block_bytes.per_token_bytes()
            )));
        }

        shared
            .budget
            .set(budget)
            .map_err(|_| TesseraError::invalid_state("token budget already published"))
    }

    fn allocate_cache(&self, budget: &TokenBudget) -> Result<(DeviceBuffer, Option<DeviceBuffer>)> {
        let backend = &self.shared.platform.backend;
        let bytes = self.shared.block_bytes;

        let cache_bytes = region_bytes(budget.max_tokens, bytes.cache_block_bytes)?;
        let cache = DeviceBuffer::allocate(Arc::clone(backend), self.device, cache_bytes)?;

        // `cache` drops (and frees) if this fails
        let scale = if bytes.scale_block_bytes > 0 {
            let scale_bytes = region_bytes(budget.max_tokens, bytes.scale_block_bytes)?;
            Some(DeviceBuffer::allocate(
                Arc::clone(backend),
                self.device,
                scale_bytes,
            )?)
        } else {
            None
        };

        info!(
            cache_bytes,
            scale_bytes = scale.as_ref().map_or(0, |s| s.size_bytes()),
            "kv cache allocated"
        );
        Ok((cache, scale))
    }
}

fn region_bytes(max_tokens: u64, block_bytes: u64) -> Result<u64> {
    max_tokens.checked_mul(block_bytes).ok_or_else(|| {
        TesseraError::internal(format!(
            "cache size overflow: {} tokens × {} bytes",
            max_tokens, block_bytes
        ))
    })
}

/// Build a runtime for the artifact at `path` on `engine`.
///
/// onnx loads the model before attaching the engine; pmx needs the engine
/// while loading.
pub fn build_runtime(
    compute: &dyn ComputeProvider,
    format: ModelFormat,
    path: &Path,
    engine: Arc<dyn Engine>,
) -> Result<Box<dyn Runtime>> {
    let mut builder = compute.create_runtime_builder(format)?;
    let resources = BuildResources::single(engine);
    let stage_error = |stage: &str, e: TesseraError| {
        TesseraError::runtime_build(format!(
            "{} failed for {}: {}",
            stage,
            path.display(),
            e.message()
        ))
    };

    match format {
        ModelFormat::Onnx => {
            builder.load_model(path).map_err(|e| stage_error("load model", e))?;
            builder
                .set_resources(resources)
                .map_err(|e| stage_error("set resources", e))?;
        }
        ModelFormat::Pmx => {
            builder
                .set_resources(resources)
                .map_err(|e| stage_error("set resources", e))?;
            builder.load_model(path).map_err(|e| stage_error("load model", e))?;
        }
    }
    builder.preprocess().map_err(|e| stage_error("preprocess", e))?;
    builder
        .create_runtime()
        .map_err(|e| stage_error("create runtime", e))
}
