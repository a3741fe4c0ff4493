//! Shared fixtures for bring-up integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Once};
use tessera_engine::{model_artifact_path, Platform};
use tessera_runtime::{SimulatedConfig, SimulatedPlatform};
use tessera_types::{DeviceId, ModelConfig, ModelFormat, ServerConfig};

static TEST_INIT: Once = Once::new();

/// Install a test log writer once per test binary
pub fn init_test_env() {
    TEST_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_test_writer()
            .try_init();
    });
}

pub const GIB: u64 = 1024 * 1024 * 1024;

pub struct Bringup {
    pub sim: Arc<SimulatedPlatform>,
    pub dir: tempfile::TempDir,
}

impl Bringup {
    /// `devices` simulated devices with shards for both artifact formats
    pub fn new(devices: usize) -> Self {
        Self::with_config(SimulatedConfig {
            device_count: devices,
            memory_per_device: GIB,
            ..Default::default()
        })
    }

    pub fn with_config(config: SimulatedConfig) -> Self {
        init_test_env();
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..config.device_count {
            for format in [ModelFormat::Onnx, ModelFormat::Pmx] {
                write_shard(dir.path(), DeviceId(i), format);
            }
        }
        Self {
            sim: Arc::new(SimulatedPlatform::new(config)),
            dir,
        }
    }

    pub fn platform(&self) -> Platform {
        Platform::simulated(self.sim.clone())
    }

    /// Platform with no collective provider
    pub fn single_device_platform(&self) -> Platform {
        Platform::new(self.sim.clone(), self.sim.clone(), self.sim.clone())
    }

    pub fn server(&self, tp: usize) -> ServerConfig {
        ServerConfig {
            model_dir: self.dir.path().to_path_buf(),
            tensor_parallel_size: tp,
            max_tokens_scale: 0.5,
            ..Default::default()
        }
    }
}

pub fn write_shard(model_dir: &Path, device: DeviceId, format: ModelFormat) {
    let path = model_artifact_path(model_dir, device, format);
    fs::create_dir_all(path.parent().expect("shard dir")).expect("create shard dir");
    fs::write(&path, format.extension()).expect("write shard");
}

/// 32 layers, 32 heads, 8 kv heads, hidden 4096
pub fn gqa_model(cache_quant_bit: u32, cache_quant_group: u32) -> ModelConfig {
    ModelConfig {
        num_layers: 32,
        num_heads: 32,
        num_kv_heads: 8,
        hidden_dim: 4096,
        cache_quant_bit,
        cache_quant_group,
    }
}
