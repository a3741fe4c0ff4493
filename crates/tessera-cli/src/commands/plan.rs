//! Capacity plan command

use crate::config::CliConfig;
use crate::output::{print_field, print_json, OutputFormat};
use crate::utils::format_bytes;
use clap::Args;
use colored::*;
use serde::Serialize;
use tessera_engine::{BlockBytes, CapacityPlanner, TokenBudget};
use tessera_types::Result;

#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Free device memory to plan against (defaults to simulation.memory_bytes)
    #[arg(long)]
    pub available_bytes: Option<u64>,

    /// Override server.tensor_parallel_size
    #[arg(long)]
    pub tensor_parallel_size: Option<usize>,

    /// Override server.max_tokens_scale
    #[arg(long)]
    pub max_tokens_scale: Option<f32>,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    tensor_parallel_size: usize,
    cache_quant_bit: u32,
    block_bytes: BlockBytes,
    max_tokens_scale: f32,
    budget: TokenBudget,
}

pub async fn execute(cmd: PlanCommand, config: CliConfig, format: OutputFormat) -> Result<()> {
    let model = config.resolve_model()?;
    let mut server = config.server.clone();
    if let Some(tp) = cmd.tensor_parallel_size {
        server.tensor_parallel_size = tp;
    }
    if let Some(scale) = cmd.max_tokens_scale {
        server.max_tokens_scale = scale;
    }
    server.validate()?;

    let block_bytes = CapacityPlanner::compute_block_bytes(&model, server.tensor_parallel_size)?;
    let available = cmd
        .available_bytes
        .unwrap_or(config.simulation.memory_bytes);
    let budget = CapacityPlanner::compute_token_budget(
        available,
        block_bytes.cache_block_bytes,
        block_bytes.scale_block_bytes,
        server.max_tokens_scale,
    )?;

    let report = PlanReport {
        tensor_parallel_size: server.tensor_parallel_size,
        cache_quant_bit: model.cache_quant_bit,
        block_bytes,
        max_tokens_scale: server.max_tokens_scale,
        budget,
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Pretty => {
            println!("{}", "Capacity plan".bright_blue().bold());
            print_field("Tensor parallel size", report.tensor_parallel_size);
            print_field("Cache element", format!("{:?}", model.cache_data_type()?));
            print_field("Cache block bytes", block_bytes.cache_block_bytes);
            print_field("Scale block bytes", block_bytes.scale_block_bytes);
            print_field("Available", format_bytes(budget.available_bytes));
            print_field("Reserved", format_bytes(budget.reserved_bytes));
            print_field("Max tokens", budget.max_tokens);
            print_field("Cache per device", format_bytes(budget.cache_max_bytes));
            print_field("Scale per device", format_bytes(budget.scale_max_bytes));
            Ok(())
        }
    }
}
