//! Model artifact layout: `<model_dir>/model_slice_<i>/model.<ext>`

use std::path::{Path, PathBuf};
use tessera_types::{DeviceId, ModelFormat};

/// Directory holding the shard for `device`
pub fn model_shard_dir(model_dir: &Path, device: DeviceId) -> PathBuf {
    model_dir.join(format!("model_slice_{}", device.index()))
}

/// Path of the artifact `device` loads
pub fn model_artifact_path(model_dir: &Path, device: DeviceId, format: ModelFormat) -> PathBuf {
    model_shard_dir(model_dir, device).join(format!("model.{}", format.extension()))
}
