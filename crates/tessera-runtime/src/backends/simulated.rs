//! In-process simulated device platform
//!
//! Implements every collaborator contract without hardware. Each stream,
//! engine, device context, runtime, communicator, sampler and allocation is
//! counted while it is alive, so tests can assert that a failed bring-up
//! released everything it acquired. Faults can be injected per device and
//! per stage to exercise the failure paths.

use crate::memory::{MemoryStats, MemoryStatsTracker};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_interfaces::{
    BuildResources, CollectiveProvider, Communicator, ComputeProvider, DeviceBackend,
    DeviceContext, DeviceContextOptions, DeviceSampler, Engine, EngineOption, EngineOptions,
    MemoryHandle, MemoryInfo, Runtime, RuntimeBuilder, SamplerFactory, StreamHandle,
};
use tessera_types::{
    DeviceContextKind, DeviceId, MemoryPolicy, ModelFormat, QuantMethod, Result, TesseraError,
};
use tracing::{debug, info, warn};

/// Bring-up stage at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStage {
    Bind,
    Stream,
    Engine,
    /// Attaching the communicator to the engine
    CommConfig,
    RuntimeBuild,
    IoContext,
    MemoryQuery,
    /// First allocation on the device
    CacheAlloc,
    /// Second allocation on the device
    ScaleAlloc,
    Collective,
    Sampler,
}

impl FaultStage {
    pub const ALL: [FaultStage; 11] = [
        FaultStage::Bind,
        FaultStage::Stream,
        FaultStage::Engine,
        FaultStage::CommConfig,
        FaultStage::RuntimeBuild,
        FaultStage::IoContext,
        FaultStage::MemoryQuery,
        FaultStage::CacheAlloc,
        FaultStage::ScaleAlloc,
        FaultStage::Collective,
        FaultStage::Sampler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultStage::Bind => "bind",
            FaultStage::Stream => "stream",
            FaultStage::Engine => "engine",
            FaultStage::CommConfig => "comm_config",
            FaultStage::RuntimeBuild => "runtime_build",
            FaultStage::IoContext => "io_context",
            FaultStage::MemoryQuery => "memory_query",
            FaultStage::CacheAlloc => "cache_alloc",
            FaultStage::ScaleAlloc => "scale_alloc",
            FaultStage::Collective => "collective",
            FaultStage::Sampler => "sampler",
        }
    }

    fn error(&self, device: DeviceId) -> TesseraError {
        let message = format!("injected {} failure on {}", self, device);
        match self {
            FaultStage::CommConfig | FaultStage::Collective => TesseraError::collective(message),
            FaultStage::RuntimeBuild => TesseraError::runtime_build(message),
            FaultStage::CacheAlloc | FaultStage::ScaleAlloc => {
                TesseraError::out_of_memory(message)
            }
            _ => TesseraError::device(message),
        }
    }
}

impl std::fmt::Display for FaultStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultStage {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        FaultStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.replace('-', "_"))
            .ok_or_else(|| TesseraError::config(format!("unknown fault stage: {}", s)))
    }
}

/// What an injected fault does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Return the stage's error
    Fail,
    /// Panic on the calling thread
    Panic,
    /// Sleep, then continue normally
    Stall(Duration),
}

/// A fault bound to one device and one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    pub device: DeviceId,
    pub stage: FaultStage,
    pub action: FaultAction,
}

impl FaultPlan {
    pub fn fail(device: DeviceId, stage: FaultStage) -> Self {
        Self {
            device,
            stage,
            action: FaultAction::Fail,
        }
    }

    pub fn panic(device: DeviceId, stage: FaultStage) -> Self {
        Self {
            device,
            stage,
            action: FaultAction::Panic,
        }
    }

    pub fn stall(device: DeviceId, stage: FaultStage, duration: Duration) -> Self {
        Self {
            device,
            stage,
            action: FaultAction::Stall(duration),
        }
    }
}

/// Simulated hardware description
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub device_count: usize,
    /// Memory per device (bytes)
    pub memory_per_device: u64,
    /// Whether the alternate (pmx) artifact format can be built
    pub supports_pmx: bool,
    pub runtime_inputs: usize,
    pub runtime_outputs: usize,
    /// Require artifact files to exist on disk
    pub verify_artifacts: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            device_count: 8,
            memory_per_device: 16 * 1024 * 1024 * 1024,
            supports_pmx: false,
            runtime_inputs: 4,
            runtime_outputs: 1,
            verify_artifacts: true,
        }
    }
}

/// Live resource counts at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub streams: usize,
    pub engines: usize,
    pub device_contexts: usize,
    pub runtimes: usize,
    pub communicators: usize,
    pub samplers: usize,
    pub allocations: usize,
    pub allocated_bytes: u64,
}

impl LedgerSnapshot {
    /// True when nothing is alive
    pub fn is_clean(&self) -> bool {
        *self == LedgerSnapshot::default()
    }
}

#[derive(Debug, Default)]
struct Shared {
    engines: AtomicUsize,
    device_contexts: AtomicUsize,
    runtimes: AtomicUsize,
    communicators: AtomicUsize,
    samplers: AtomicUsize,
    comm_attachments: AtomicUsize,
    faults: Mutex<Vec<FaultPlan>>,
}

impl Shared {
    fn trip(&self, device: DeviceId, stage: FaultStage) -> Result<()> {
        let plan = self
            .faults
            .lock()
            .iter()
            .find(|p| p.device == device && p.stage == stage)
            .copied();

        match plan.map(|p| p.action) {
            None => Ok(()),
            Some(FaultAction::Fail) => {
                debug!(device = device.index(), stage = %stage, "injected fault fired");
                Err(stage.error(device))
            }
            Some(FaultAction::Panic) => {
                panic!("injected {} panic on {}", stage, device)
            }
            Some(FaultAction::Stall(duration)) => {
                debug!(
                    device = device.index(),
                    stage = %stage,
                    stall_ms = duration.as_millis() as u64,
                    "injected stall"
                );
                std::thread::sleep(duration);
                Ok(())
            }
        }
    }
}

fn release(counter: &AtomicUsize) {
    counter.fetch_sub(1, Ordering::SeqCst);
}

/// Simulated accelerator platform implementing every collaborator contract
pub struct SimulatedPlatform {
    config: SimulatedConfig,
    shared: Arc<Shared>,
    next_handle: AtomicU64,
    streams: Mutex<HashMap<u64, DeviceId>>,
    allocations: Mutex<HashMap<u64, (DeviceId, u64)>>,
    allocation_calls: Mutex<HashMap<DeviceId, usize>>,
    stats: Vec<MemoryStatsTracker>,
}

impl SimulatedPlatform {
    pub fn new(config: SimulatedConfig) -> Self {
        info!(
            devices = config.device_count,
            memory_per_device = config.memory_per_device,
            "simulated platform created"
        );
        let stats = (0..config.device_count)
            .map(|i| MemoryStatsTracker::new(DeviceId(i)))
            .collect();
        Self {
            config,
            shared: Arc::new(Shared::default()),
            next_handle: AtomicU64::new(1),
            streams: Mutex::new(HashMap::new()),
            allocations: Mutex::new(HashMap::new()),
            allocation_calls: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Add a fault to fire when its device reaches its stage
    pub fn with_fault(self, plan: FaultPlan) -> Self {
        self.inject_fault(plan);
        self
    }

    pub fn inject_fault(&self, plan: FaultPlan) {
        self.shared.faults.lock().push(plan);
    }

    pub fn clear_faults(&self) {
        self.shared.faults.lock().clear();
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    /// Current live resource counts
    pub fn ledger(&self) -> LedgerSnapshot {
        let allocations = self.allocations.lock();
        LedgerSnapshot {
            streams: self.streams.lock().len(),
            engines: self.shared.engines.load(Ordering::SeqCst),
            device_contexts: self.shared.device_contexts.load(Ordering::SeqCst),
            runtimes: self.shared.runtimes.load(Ordering::SeqCst),
            communicators: self.shared.communicators.load(Ordering::SeqCst),
            samplers: self.shared.samplers.load(Ordering::SeqCst),
            allocations: allocations.len(),
            allocated_bytes: allocations.values().map(|(_, bytes)| *bytes).sum(),
        }
    }

    /// Number of engines that were handed a communicator
    pub fn comm_attachments(&self) -> usize {
        self.shared.comm_attachments.load(Ordering::SeqCst)
    }

    pub fn memory_stats(&self, device: DeviceId) -> Option<MemoryStats> {
        self.stats.get(device.index()).map(|t| t.stats())
    }

    fn next_id(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    fn check_device(&self, device: DeviceId) -> Result<&MemoryStatsTracker> {
        self.stats.get(device.index()).ok_or_else(|| {
            TesseraError::device(format!(
                "{} not present ({} visible)",
                device, self.config.device_count
            ))
        })
    }
}

impl std::fmt::Debug for SimulatedPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlatform")
            .field("config", &self.config)
            .field("ledger", &self.ledger())
            .finish()
    }
}

impl DeviceBackend for SimulatedPlatform {
    fn name(&self) -> &str {
        "simulated"
    }

    fn device_count(&self) -> Result<usize> {
        Ok(self.config.device_count)
    }

    fn bind_device(&self, device: DeviceId) -> Result<()> {
        self.check_device(device)?;
        self.shared.trip(device, FaultStage::Bind)
    }

    fn create_stream(&self, device: DeviceId) -> Result<StreamHandle> {
        self.check_device(device)?;
        self.shared.trip(device, FaultStage::Stream)?;
        let id = self.next_id();
        self.streams.lock().insert(id, device);
        Ok(StreamHandle(id))
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<()> {
        self.streams
            .lock()
            .remove(&stream.id())
            .map(|_| ())
            .ok_or_else(|| TesseraError::not_found(format!("unknown stream {}", stream.id())))
    }

    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo> {
        let tracker = self.check_device(device)?;
        self.shared.trip(device, FaultStage::MemoryQuery)?;
        let total = self.config.memory_per_device;
        Ok(MemoryInfo {
            total_bytes: total,
            free_bytes: total.saturating_sub(tracker.current_usage()),
        })
    }

    fn allocate(&self, device: DeviceId, bytes: u64) -> Result<MemoryHandle> {
        let tracker = self.check_device(device)?;

        let call = {
            let mut calls = self.allocation_calls.lock();
            let n = calls.entry(device).or_insert(0);
            *n += 1;
            *n
        };
        let stage = match call {
            1 => Some(FaultStage::CacheAlloc),
            2 => Some(FaultStage::ScaleAlloc),
            _ => None,
        };
        if let Some(stage) = stage {
            if let Err(e) = self.shared.trip(device, stage) {
                tracker.record_failure();
                return Err(e);
            }
        }

        let free = self
            .config
            .memory_per_device
            .saturating_sub(tracker.current_usage());
        if bytes > free {
            tracker.record_failure();
            return Err(TesseraError::out_of_memory(format!(
                "{}: requested {} bytes, {} available",
                device, bytes, free
            )));
        }

        let id = self.next_id();
        self.allocations.lock().insert(id, (device, bytes));
        tracker.record_allocation(bytes);
        Ok(MemoryHandle(id))
    }

    fn free(&self, handle: MemoryHandle) -> Result<()> {
        let (device, bytes) = self
            .allocations
            .lock()
            .remove(&handle.id())
            .ok_or_else(|| {
                TesseraError::not_found(format!("unknown allocation {}", handle.id()))
            })?;
        if let Some(tracker) = self.stats.get(device.index()) {
            tracker.record_free(bytes);
        }
        Ok(())
    }
}

impl ComputeProvider for SimulatedPlatform {
    fn name(&self) -> &str {
        "simulated"
    }

    fn supports_format(&self, format: ModelFormat) -> bool {
        match format {
            ModelFormat::Onnx => true,
            ModelFormat::Pmx => self.config.supports_pmx,
        }
    }

    fn create_engine(&self, options: &EngineOptions) -> Result<Box<dyn Engine>> {
        self.check_device(options.device)?;
        self.shared.trip(options.device, FaultStage::Engine)?;
        self.shared.engines.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimEngine {
            name: format!("sim-engine-{}", options.device.index()),
            device: options.device,
            quant_method: options.quant_method,
            memory_policy: options.memory_policy,
            communicator: None,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn create_device_context(
        &self,
        options: &DeviceContextOptions,
    ) -> Result<Arc<dyn DeviceContext>> {
        self.check_device(options.device)?;
        self.shared.trip(options.device, FaultStage::IoContext)?;
        self.shared.device_contexts.fetch_add(1, Ordering::SeqCst);
        debug!(
            device = options.device.index(),
            stream = options.stream.id(),
            policy = ?options.memory_policy,
            "device context created"
        );
        Ok(Arc::new(SimDeviceContext {
            kind: DeviceContextKind::Accelerator,
            device: Some(options.device),
            stream: Some(options.stream),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn create_host_device_context(&self) -> Result<Arc<dyn DeviceContext>> {
        self.shared.device_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimDeviceContext {
            kind: DeviceContextKind::Host,
            device: None,
            stream: None,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn create_runtime_builder(&self, format: ModelFormat) -> Result<Box<dyn RuntimeBuilder>> {
        if !self.supports_format(format) {
            return Err(TesseraError::unsupported(format!(
                "model format '{}' is not available on the simulated platform",
                format
            )));
        }
        Ok(Box::new(SimRuntimeBuilder {
            format,
            inputs: self.config.runtime_inputs,
            outputs: self.config.runtime_outputs,
            verify_artifacts: self.config.verify_artifacts,
            loaded: false,
            preprocessed: false,
            resources: None,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl CollectiveProvider for SimulatedPlatform {
    fn name(&self) -> &str {
        "simulated"
    }

    fn init_group(&self, devices: &[DeviceId]) -> Result<Vec<Arc<dyn Communicator>>> {
        for &device in devices {
            self.check_device(device)?;
            self.shared.trip(device, FaultStage::Collective)?;
        }

        let world_size = devices.len();
        let comms = devices
            .iter()
            .enumerate()
            .map(|(rank, &device)| {
                self.shared.communicators.fetch_add(1, Ordering::SeqCst);
                Arc::new(SimCommunicator {
                    rank,
                    world_size,
                    device,
                    shared: Arc::clone(&self.shared),
                }) as Arc<dyn Communicator>
            })
            .collect();
        debug!(world_size, "simulated communicator group created");
        Ok(comms)
    }
}

impl SamplerFactory for SimulatedPlatform {
    fn create_sampler(&self, stream: StreamHandle) -> Result<Box<dyn DeviceSampler>> {
        let device = self
            .streams
            .lock()
            .get(&stream.id())
            .copied()
            .ok_or_else(|| {
                TesseraError::not_found(format!("sampler stream {} does not exist", stream.id()))
            })?;
        self.shared.trip(device, FaultStage::Sampler)?;
        self.shared.samplers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimSampler {
            stream,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct SimEngine {
    name: String,
    device: DeviceId,
    quant_method: QuantMethod,
    memory_policy: MemoryPolicy,
    communicator: Option<Arc<dyn Communicator>>,
    shared: Arc<Shared>,
}

impl Engine for SimEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> DeviceId {
        self.device
    }

    fn configure(&mut self, option: EngineOption) -> Result<()> {
        match option {
            EngineOption::TensorParallelComm(comm) => {
                self.shared.trip(self.device, FaultStage::CommConfig)?;
                if comm.device() != self.device {
                    return Err(TesseraError::collective(format!(
                        "communicator for {} attached to engine on {}",
                        comm.device(),
                        self.device
                    )));
                }
                debug!(
                    device = self.device.index(),
                    rank = comm.rank(),
                    world_size = comm.world_size(),
                    quant = %self.quant_method,
                    policy = ?self.memory_policy,
                    "communicator attached"
                );
                self.communicator = Some(comm);
                self.shared.comm_attachments.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        release(&self.shared.engines);
    }
}

struct SimDeviceContext {
    kind: DeviceContextKind,
    device: Option<DeviceId>,
    stream: Option<StreamHandle>,
    shared: Arc<Shared>,
}

impl DeviceContext for SimDeviceContext {
    fn kind(&self) -> DeviceContextKind {
        self.kind
    }

    fn device(&self) -> Option<DeviceId> {
        self.device
    }

    fn stream(&self) -> Result<StreamHandle> {
        self.stream.ok_or_else(|| {
            TesseraError::unsupported(format!("{} device context has no stream", self.kind))
        })
    }
}

impl Drop for SimDeviceContext {
    fn drop(&mut self) {
        release(&self.shared.device_contexts);
    }
}

struct SimRuntimeBuilder {
    format: ModelFormat,
    inputs: usize,
    outputs: usize,
    verify_artifacts: bool,
    loaded: bool,
    preprocessed: bool,
    resources: Option<BuildResources>,
    shared: Arc<Shared>,
}

impl RuntimeBuilder for SimRuntimeBuilder {
    fn format(&self) -> ModelFormat {
        self.format
    }

    fn load_model(&mut self, path: &Path) -> Result<()> {
        if self.format == ModelFormat::Pmx && self.resources.is_none() {
            return Err(TesseraError::invalid_state(
                "pmx models must be loaded with resources attached",
            ));
        }
        if path.extension().and_then(|e| e.to_str()) != Some(self.format.extension()) {
            return Err(TesseraError::runtime_build(format!(
                "{} is not a {} model",
                path.display(),
                self.format
            )));
        }
        if self.verify_artifacts && !path.is_file() {
            return Err(TesseraError::runtime_build(format!(
                "model artifact not found: {}",
                path.display()
            )));
        }
        self.loaded = true;
        Ok(())
    }

    fn set_resources(&mut self, resources: BuildResources) -> Result<()> {
        if resources.engines.is_empty() {
            return Err(TesseraError::runtime_build("no engines in build resources"));
        }
        self.resources = Some(resources);
        Ok(())
    }

    fn preprocess(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(TesseraError::invalid_state("preprocess before model load"));
        }
        self.preprocessed = true;
        Ok(())
    }

    fn create_runtime(self: Box<Self>) -> Result<Box<dyn Runtime>> {
        let this = *self;
        let resources = this
            .resources
            .ok_or_else(|| TesseraError::invalid_state("runtime created without resources"))?;
        if !this.preprocessed {
            return Err(TesseraError::invalid_state("runtime created before preprocess"));
        }
        let device = resources
            .engines
            .first()
            .map(|e| e.device())
            .ok_or_else(|| TesseraError::runtime_build("no engines in build resources"))?;
        this.shared.trip(device, FaultStage::RuntimeBuild)?;

        this.shared.runtimes.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimRuntime {
            inputs: vec![None; this.inputs],
            outputs: vec![None; this.outputs],
            _resources: resources,
            shared: this.shared,
        }))
    }
}

struct SimRuntime {
    inputs: Vec<Option<Arc<dyn DeviceContext>>>,
    outputs: Vec<Option<Arc<dyn DeviceContext>>>,
    _resources: BuildResources,
    shared: Arc<Shared>,
}

fn bind_slot(
    slots: &mut [Option<Arc<dyn DeviceContext>>],
    index: usize,
    ctx: Arc<dyn DeviceContext>,
    what: &str,
) -> Result<()> {
    let len = slots.len();
    let slot = slots.get_mut(index).ok_or_else(|| {
        TesseraError::not_found(format!("{} {} out of range ({} slots)", what, index, len))
    })?;
    *slot = Some(ctx);
    Ok(())
}

impl Runtime for SimRuntime {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn bind_input(&mut self, index: usize, ctx: Arc<dyn DeviceContext>) -> Result<()> {
        bind_slot(&mut self.inputs, index, ctx, "input")
    }

    fn bind_output(&mut self, index: usize, ctx: Arc<dyn DeviceContext>) -> Result<()> {
        bind_slot(&mut self.outputs, index, ctx, "output")
    }

    fn device_contexts(&self) -> Vec<Arc<dyn DeviceContext>> {
        let mut unique: Vec<Arc<dyn DeviceContext>> = Vec::new();
        for ctx in self.inputs.iter().chain(self.outputs.iter()).flatten() {
            if !unique.iter().any(|c| Arc::ptr_eq(c, ctx)) {
                unique.push(Arc::clone(ctx));
            }
        }
        unique
    }
}

impl Drop for SimRuntime {
    fn drop(&mut self) {
        release(&self.shared.runtimes);
    }
}

struct SimCommunicator {
    rank: usize,
    world_size: usize,
    device: DeviceId,
    shared: Arc<Shared>,
}

impl Communicator for SimCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn device(&self) -> DeviceId {
        self.device
    }
}

impl Drop for SimCommunicator {
    fn drop(&mut self) {
        release(&self.shared.communicators);
    }
}

struct SimSampler {
    stream: StreamHandle,
    shared: Arc<Shared>,
}

impl DeviceSampler for SimSampler {
    fn name(&self) -> &str {
        "simulated"
    }

    fn stream(&self) -> StreamHandle {
        self.stream
    }
}

impl Drop for SimSampler {
    fn drop(&mut self) {
        release(&self.shared.samplers);
    }
}

impl Drop for SimulatedPlatform {
    fn drop(&mut self) {
        let leaked = self.allocations.get_mut().len();
        if leaked > 0 {
            warn!(allocations = leaked, "simulated platform dropped with live allocations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(devices: usize) -> SimulatedPlatform {
        SimulatedPlatform::new(SimulatedConfig {
            device_count: devices,
            memory_per_device: 1024,
            verify_artifacts: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_fault_stage_parsing() {
        assert_eq!("runtime_build".parse::<FaultStage>().unwrap(), FaultStage::RuntimeBuild);
        assert_eq!("cache-alloc".parse::<FaultStage>().unwrap(), FaultStage::CacheAlloc);
        assert!("warp".parse::<FaultStage>().unwrap_err().is_config_error());
        for stage in FaultStage::ALL {
            assert_eq!(stage.as_str().parse::<FaultStage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_device_rejected() {
        let sim = sim(2);
        let err = sim.bind_device(DeviceId(5)).unwrap_err();
        assert!(err.is_device_error());
        assert!(err.to_string().contains("device:5"));
    }

    #[test]
    fn test_memory_info_reflects_allocations() {
        let sim = sim(1);
        let handle = sim.allocate(DeviceId(0), 256).unwrap();
        assert_eq!(sim.memory_info(DeviceId(0)).unwrap().free_bytes, 768);
        sim.free(handle).unwrap();
        assert_eq!(sim.memory_info(DeviceId(0)).unwrap().free_bytes, 1024);
        assert!(sim.free(handle).is_err());
    }

    #[test]
    fn test_cache_and_scale_faults_target_allocation_order() {
        let sim = sim(1).with_fault(FaultPlan::fail(DeviceId(0), FaultStage::ScaleAlloc));
        let cache = sim.allocate(DeviceId(0), 64).unwrap();
        let err = sim.allocate(DeviceId(0), 8).unwrap_err();
        assert!(matches!(err, TesseraError::OutOfMemory { .. }));
        sim.free(cache).unwrap();
        assert_eq!(sim.memory_stats(DeviceId(0)).unwrap().allocation_failures, 1);
    }

    #[test]
    fn test_pmx_requires_support() {
        let sim = sim(1);
        assert!(!sim.supports_format(ModelFormat::Pmx));
        let err = sim.create_runtime_builder(ModelFormat::Pmx).err().unwrap();
        assert!(matches!(err, TesseraError::Unsupported { .. }));
    }

    #[test]
    fn test_runtime_holds_engine_until_dropped() {
        let sim = sim(1);
        let stream = sim.create_stream(DeviceId(0)).unwrap();
        let engine: Arc<dyn Engine> = Arc::from(
            sim.create_engine(&EngineOptions {
                device: DeviceId(0),
                quant_method: QuantMethod::None,
                memory_policy: MemoryPolicy::Compact,
                stream,
            })
            .unwrap(),
        );

        let mut builder = sim.create_runtime_builder(ModelFormat::Onnx).unwrap();
        builder.load_model(Path::new("model.onnx")).unwrap();
        builder.set_resources(BuildResources::single(engine)).unwrap();
        builder.preprocess().unwrap();
        let runtime = builder.create_runtime().unwrap();
        assert_eq!(sim.ledger().engines, 1);
        assert_eq!(sim.ledger().runtimes, 1);

        drop(runtime);
        sim.destroy_stream(stream).unwrap();
        assert!(sim.ledger().is_clean());
    }

    #[test]
    fn test_device_context_exposes_its_stream() {
        let sim = sim(2);
        let stream = sim.create_stream(DeviceId(1)).unwrap();
        let ctx = sim
            .create_device_context(&DeviceContextOptions {
                device: DeviceId(1),
                stream,
                memory_policy: MemoryPolicy::Performance,
            })
            .unwrap();
        assert_eq!(ctx.kind(), DeviceContextKind::Accelerator);
        assert_eq!(ctx.device(), Some(DeviceId(1)));
        assert_eq!(ctx.stream().unwrap(), stream);
        assert_eq!(sim.ledger().device_contexts, 1);

        drop(ctx);
        sim.destroy_stream(stream).unwrap();
        assert!(sim.ledger().is_clean());
    }

    #[test]
    fn test_host_context_has_no_stream() {
        let sim = sim(1);
        let host = sim.create_host_device_context().unwrap();
        assert_eq!(host.kind(), DeviceContextKind::Host);
        assert!(host.stream().is_err());
    }

    #[test]
    fn test_collective_group_ranks() {
        let sim = sim(4);
        let devices: Vec<_> = (0..4).map(DeviceId).collect();
        let comms = sim.init_group(&devices).unwrap();
        assert_eq!(comms.len(), 4);
        for (rank, comm) in comms.iter().enumerate() {
            assert_eq!(comm.rank(), rank);
            assert_eq!(comm.world_size(), 4);
        }
        assert_eq!(sim.ledger().communicators, 4);
        drop(comms);
        assert_eq!(sim.ledger().communicators, 0);
    }
}
