//! Simulated bring-up command
//!
//! Runs the full bring-up path against the simulated platform and reports
//! what each device allocated, or the root-cause failure.

use crate::config::CliConfig;
use crate::output::{print_field, print_json, OutputFormat};
use crate::utils::format_bytes;
use clap::Args;
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_engine::{BringupSummary, Platform, ResourceManager};
use tessera_runtime::{FaultPlan, FaultStage, LedgerSnapshot, SimulatedConfig, SimulatedPlatform};
use tessera_types::{DeviceId, Result, TesseraError};
use tracing::info;

#[derive(Args, Debug)]
pub struct BringupCommand {
    /// Number of devices (sets both the simulated device count and the tensor parallel size)
    #[arg(long)]
    pub devices: Option<usize>,

    /// Simulated memory per device in bytes
    #[arg(long)]
    pub memory_bytes: Option<u64>,

    /// Override server.model_dir
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Rendezvous timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Inject a failure on this device
    #[arg(long, requires = "fail_stage")]
    pub fail_device: Option<usize>,

    /// Stage at which the injected failure fires (bind, engine, runtime_build, ...)
    #[arg(long, requires = "fail_device")]
    pub fail_stage: Option<FaultStage>,
}

#[derive(Debug, Serialize)]
struct BringupReport {
    summary: BringupSummary,
    ledger_after_teardown: LedgerSnapshot,
}

pub async fn execute(cmd: BringupCommand, config: CliConfig, format: OutputFormat) -> Result<()> {
    let model = config.resolve_model()?;
    let mut server = config.server.clone();
    let mut sim_config = SimulatedConfig {
        device_count: config.simulation.devices,
        memory_per_device: config.simulation.memory_bytes,
        supports_pmx: config.simulation.supports_pmx,
        verify_artifacts: config.simulation.verify_artifacts,
        ..Default::default()
    };
    if let Some(devices) = cmd.devices {
        sim_config.device_count = devices;
        server.tensor_parallel_size = devices;
    }
    if let Some(memory) = cmd.memory_bytes {
        sim_config.memory_per_device = memory;
    }
    if let Some(dir) = cmd.model_dir {
        server.model_dir = dir;
    }
    let mut rendezvous = config.rendezvous.clone();
    if cmd.timeout_ms.is_some() {
        rendezvous.timeout_ms = cmd.timeout_ms;
    }

    let sim = Arc::new(SimulatedPlatform::new(sim_config));
    if let (Some(device), Some(stage)) = (cmd.fail_device, cmd.fail_stage) {
        info!(device, stage = %stage, "injecting fault");
        sim.inject_fault(FaultPlan::fail(DeviceId(device), stage));
    }

    // Bring-up blocks on device worker threads
    let platform = Platform::simulated(Arc::clone(&sim));
    let outcome = tokio::task::spawn_blocking(move || {
        let mut manager = ResourceManager::new(platform).with_rendezvous(rendezvous);
        manager.init(&model, &server)?;
        manager
            .summary()
            .ok_or_else(|| TesseraError::internal("bring-up finished without a summary"))
    })
    .await
    .map_err(|e| TesseraError::internal(format!("bring-up task failed: {}", e)))?;

    let ledger = sim.ledger();
    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if ledger.is_clean() {
                eprintln!("{} all device resources released", "Note:".yellow());
            } else {
                eprintln!("{} leaked resources: {:?}", "Warning:".yellow().bold(), ledger);
            }
            return Err(e);
        }
    };

    let report = BringupReport {
        summary,
        ledger_after_teardown: ledger,
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Pretty => {
            let summary = &report.summary;
            println!("{}", "Bring-up complete".green().bold());
            print_field("Devices", summary.devices.len());
            print_field("Available on device 0", format_bytes(summary.budget.available_bytes));
            print_field("Max tokens", summary.budget.max_tokens);
            for device in &summary.devices {
                println!(
                    "  {}: cache {} scale {} ({} inputs, {} outputs)",
                    device.device.to_string().bold(),
                    format_bytes(device.cache_bytes).cyan(),
                    format_bytes(device.scale_bytes).cyan(),
                    device.runtime_inputs,
                    device.runtime_outputs
                );
            }
            print_field(
                "Released on teardown",
                if report.ledger_after_teardown.is_clean() {
                    "all"
                } else {
                    "incomplete"
                },
            );
            Ok(())
        }
    }
}
