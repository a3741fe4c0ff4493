//! End-to-end bring-up against the simulated platform

mod common;

use common::{gqa_model, Bringup, GIB};
use std::time::{Duration, Instant};
use tessera_engine::{CapacityPlanner, ResourceManager};
use tessera_runtime::{FaultPlan, FaultStage, SimulatedConfig};
use tessera_types::{DeviceContextKind, DeviceId, RendezvousConfig, TesseraError};

#[test]
fn single_device_needs_no_communicator() {
    let fx = Bringup::new(1);
    let mut manager = ResourceManager::new(fx.single_device_platform());

    manager.init(&gqa_model(0, 0), &fx.server(1)).unwrap();

    assert!(manager.is_initialized());
    assert_eq!(manager.device_count(), 1);
    assert!(manager.communicators().is_empty());
    assert_eq!(fx.sim.comm_attachments(), 0);

    // 32*2*8*4096/32*2 bytes per token, half of 1 GiB reserved
    let budget = manager.token_budget().unwrap();
    assert_eq!(budget.max_tokens, (GIB / 2) / 131072);
}

#[test]
fn four_devices_share_one_budget() {
    let fx = Bringup::new(4);
    let mut manager = ResourceManager::new(fx.platform());
    let model = gqa_model(0, 0);

    manager.init(&model, &fx.server(4)).unwrap();

    let block = CapacityPlanner::compute_block_bytes(&model, 4).unwrap();
    let max_tokens = manager.token_budget().unwrap().max_tokens;
    assert!(max_tokens > 0);
    assert_eq!(manager.resources().len(), 4);
    for resource in manager.resources() {
        assert_eq!(
            resource.cache_memory.size_bytes(),
            max_tokens * block.cache_block_bytes
        );
        assert!(resource.scale_memory.is_none());
        assert_eq!(resource.host_device_context.kind(), DeviceContextKind::Host);
    }
    for (i, state) in manager.runtime_states().iter().enumerate() {
        assert_eq!(state.engine.device(), DeviceId(i));
        assert_eq!(state.stream.device(), DeviceId(i));
    }
    assert_eq!(manager.communicators().len(), 4);
    assert_eq!(fx.sim.comm_attachments(), 4);

    let summary = manager.summary().unwrap();
    assert!(summary
        .devices
        .iter()
        .all(|d| d.cache_bytes == summary.budget.cache_max_bytes));
}

#[test]
fn quantized_cache_allocates_scale_regions() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());

    manager.init(&gqa_model(8, 64), &fx.server(2)).unwrap();

    let block = manager.block_bytes().unwrap();
    assert_eq!(block.cache_block_bytes, 32768);
    assert_eq!(block.scale_block_bytes, 1024);

    let max_tokens = manager.token_budget().unwrap().max_tokens;
    assert_eq!(max_tokens, (GIB / 2) / (32768 + 1024));
    for resource in manager.resources() {
        let scale = resource.scale_memory.as_ref().unwrap();
        assert_eq!(scale.size_bytes(), max_tokens * 1024);
    }
}

#[test]
fn sampler_bound_to_primary_stream() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());
    manager.init(&gqa_model(0, 0), &fx.server(2)).unwrap();

    let sampler = manager.sampler().unwrap();
    assert_eq!(sampler.stream(), manager.runtime_states()[0].stream.handle());
    assert_eq!(fx.sim.ledger().samplers, 1);
}

#[test]
fn runtime_build_failure_releases_every_device() {
    let fx = Bringup::new(4);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(2), FaultStage::RuntimeBuild));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(4)).unwrap_err();

    assert!(matches!(err, TesseraError::RuntimeBuild { .. }));
    assert!(err.to_string().contains("device:2"));
    assert!(!manager.is_initialized());
    let ledger = fx.sim.ledger();
    assert!(ledger.is_clean(), "leaked resources: {:?}", ledger);
}

#[test]
fn leader_failure_does_not_hang_peers() {
    let fx = Bringup::new(4);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(0), FaultStage::RuntimeBuild));
    let mut manager = ResourceManager::new(fx.platform());

    let started = Instant::now();
    let err = manager.init(&gqa_model(0, 0), &fx.server(4)).unwrap_err();

    // Root cause, not a peer's cancellation
    assert!(matches!(err, TesseraError::RuntimeBuild { .. }));
    assert!(err.to_string().contains("device:0"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(manager.token_budget().is_none());
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn leader_memory_query_failure_cancels_peers() {
    let fx = Bringup::new(3);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(0), FaultStage::MemoryQuery));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(3)).unwrap_err();

    assert!(err.is_device_error());
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn panicking_device_is_reported_and_released() {
    let fx = Bringup::new(3);
    fx.sim
        .inject_fault(FaultPlan::panic(DeviceId(1), FaultStage::IoContext));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(3)).unwrap_err();

    assert!(matches!(err, TesseraError::Internal { .. }));
    assert!(err.to_string().contains("panicked"));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn stalled_device_times_out_rendezvous() {
    let fx = Bringup::new(3);
    fx.sim.inject_fault(FaultPlan::stall(
        DeviceId(2),
        FaultStage::RuntimeBuild,
        Duration::from_millis(500),
    ));
    let mut manager = ResourceManager::new(fx.platform()).with_rendezvous(RendezvousConfig {
        timeout_ms: Some(50),
    });

    let err = manager.init(&gqa_model(0, 0), &fx.server(3)).unwrap_err();

    assert!(matches!(err, TesseraError::Timeout { .. }));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn scale_allocation_failure_frees_cache() {
    let fx = Bringup::new(2);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(1), FaultStage::ScaleAlloc));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(8, 64), &fx.server(2)).unwrap_err();

    assert!(matches!(err, TesseraError::OutOfMemory { .. }));
    // Device 0 published a budget before device 1 failed
    assert!(!manager.is_initialized());
    assert!(manager.token_budget().is_none());
    assert!(manager.summary().is_none());
    let ledger = fx.sim.ledger();
    assert_eq!(ledger.allocations, 0);
    assert_eq!(ledger.allocated_bytes, 0);
    assert!(ledger.is_clean());
}

#[test]
fn unsupported_quant_bit_rejected_before_device_work() {
    let fx = Bringup::new(2);
    // Any device work would trip this
    fx.sim
        .inject_fault(FaultPlan::panic(DeviceId(0), FaultStage::Bind));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(3, 64), &fx.server(2)).unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(fx.sim.ledger().communicators, 0);
    assert_eq!(fx.sim.memory_stats(DeviceId(0)).unwrap().allocation_count, 0);
}

#[test]
fn unknown_quant_method_fails_every_device() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());
    let mut server = fx.server(2);
    server.quant_method = "online_i4i4".to_string();

    let err = manager.init(&gqa_model(0, 0), &server).unwrap_err();

    assert!(err.is_config_error());
    assert!(err.to_string().contains("online_i4i4"));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn online_int8_quant_method_accepted() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());
    let mut server = fx.server(2);
    server.quant_method = "online_i8i8".to_string();

    manager.init(&gqa_model(0, 0), &server).unwrap();
    assert!(manager.is_initialized());
}

#[test]
fn second_init_is_rejected_and_keeps_first() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());
    let model = gqa_model(0, 0);
    manager.init(&model, &fx.server(2)).unwrap();
    let budget = *manager.token_budget().unwrap();

    let err = manager.init(&model, &fx.server(2)).unwrap_err();

    assert!(matches!(err, TesseraError::InvalidState { .. }));
    assert!(manager.is_initialized());
    assert_eq!(manager.device_count(), 2);
    assert_eq!(*manager.token_budget().unwrap(), budget);
}

#[test]
fn tensor_parallel_without_collective_is_config_error() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.single_device_platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(2)).unwrap_err();

    assert!(err.is_config_error());
    assert!(err.to_string().contains("collective"));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn collective_failure_is_reported() {
    let fx = Bringup::new(2);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(1), FaultStage::Collective));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(2)).unwrap_err();

    assert!(matches!(err, TesseraError::Collective { .. }));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn more_devices_than_visible_is_config_error() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(4)).unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn alternate_format_requires_provider_support() {
    let fx = Bringup::new(2);
    let mut manager = ResourceManager::new(fx.platform());
    let mut server = fx.server(2);
    server.use_alternate_model_format = true;

    let err = manager.init(&gqa_model(0, 0), &server).unwrap_err();

    assert!(matches!(err, TesseraError::Unsupported { .. }));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn alternate_format_builds_when_supported() {
    let fx = Bringup::with_config(SimulatedConfig {
        device_count: 2,
        memory_per_device: GIB,
        supports_pmx: true,
        ..Default::default()
    });
    let mut manager = ResourceManager::new(fx.platform());
    let mut server = fx.server(2);
    server.use_alternate_model_format = true;

    manager.init(&gqa_model(0, 0), &server).unwrap();
    assert_eq!(manager.device_count(), 2);
}

#[test]
fn device_memory_too_small_for_one_token() {
    let fx = Bringup::with_config(SimulatedConfig {
        device_count: 2,
        memory_per_device: 4096,
        ..Default::default()
    });
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(2)).unwrap_err();

    assert!(matches!(err, TesseraError::OutOfMemory { .. }));
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn dropping_manager_releases_everything() {
    let fx = Bringup::new(4);
    {
        let mut manager = ResourceManager::new(fx.platform());
        manager.init(&gqa_model(8, 64), &fx.server(4)).unwrap();
        let ledger = fx.sim.ledger();
        assert_eq!(ledger.streams, 4);
        assert_eq!(ledger.runtimes, 4);
        assert_eq!(ledger.allocations, 8);
        assert_eq!(ledger.communicators, 4);
    }
    assert!(fx.sim.ledger().is_clean());
}

#[test]
fn device_bind_failure_names_the_device() {
    let fx = Bringup::new(4);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(2), FaultStage::Bind));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(4)).unwrap_err();

    assert!(err.is_device_error());
    assert!(err.to_string().contains("device:2"));
    assert!(manager.token_budget().is_none());
    let ledger = fx.sim.ledger();
    assert!(ledger.is_clean(), "leaked resources: {:?}", ledger);
}

#[test]
fn communicator_attach_failure_releases_every_device() {
    let fx = Bringup::new(4);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(3), FaultStage::CommConfig));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(0, 0), &fx.server(4)).unwrap_err();

    assert!(matches!(err, TesseraError::Collective { .. }));
    assert!(err.to_string().contains("device:3"));
    assert!(manager.communicators().is_empty());
    let ledger = fx.sim.ledger();
    assert!(ledger.is_clean(), "leaked resources: {:?}", ledger);
}

#[test]
fn sampler_failure_releases_every_device() {
    let fx = Bringup::new(2);
    fx.sim
        .inject_fault(FaultPlan::fail(DeviceId(0), FaultStage::Sampler));
    let mut manager = ResourceManager::new(fx.platform());

    let err = manager.init(&gqa_model(8, 64), &fx.server(2)).unwrap_err();

    assert!(matches!(err, TesseraError::Orchestration { .. }));
    assert!(err.to_string().contains("device:0"));
    assert!(!manager.is_initialized());
    assert!(manager.token_budget().is_none());
    assert!(manager.resources().is_empty());
    let ledger = fx.sim.ledger();
    assert!(ledger.is_clean(), "leaked resources: {:?}", ledger);
}
