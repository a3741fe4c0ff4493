//! Configuration command implementation

use crate::output::{print_field, print_json, OutputFormat};
use crate::config::CliConfig;
use clap::Args;
use colored::*;
use tessera_types::Result;

#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Show current configuration
    #[arg(short, long)]
    pub show: bool,

    /// Validate configuration
    #[arg(long)]
    pub validate: bool,

    /// Generate default configuration
    #[arg(long)]
    pub generate: bool,

    /// Output file for generated config
    #[arg(short, long)]
    pub output: Option<String>,
}

pub async fn execute(cmd: ConfigCommand, config: CliConfig, format: OutputFormat) -> Result<()> {
    if cmd.validate {
        return validate_config(&config);
    }

    if cmd.generate {
        return generate_config(cmd.output.as_deref()).await;
    }

    // Default: show config
    show_config(&config, format)
}

fn show_config(config: &CliConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Pretty => {
            println!("{}", "Current configuration".bright_blue().bold());

            println!("Model:");
            if let Some(path) = &config.model_config_path {
                print_field("Config file", path.display());
            }
            print_field("Layers", config.model.num_layers);
            print_field("Heads", config.model.num_heads);
            print_field("KV heads", config.model.num_kv_heads);
            print_field("Hidden dim", config.model.hidden_dim);
            print_field("Cache quant bit", config.model.cache_quant_bit);

            println!("Server:");
            print_field("Model directory", config.server.model_dir.display());
            print_field("Tensor parallel size", config.server.tensor_parallel_size);
            print_field("Model format", config.server.model_format());
            print_field("Quant method", &config.server.quant_method);
            print_field("Max tokens scale", config.server.max_tokens_scale);

            println!("Rendezvous:");
            match config.rendezvous.timeout_ms {
                Some(ms) => print_field("Timeout", format!("{} ms", ms)),
                None => print_field("Timeout", "none"),
            }

            println!("Simulation:");
            print_field("Devices", config.simulation.devices);
            print_field("Memory per device", config.simulation.memory_bytes);
            Ok(())
        }
    }
}

fn validate_config(config: &CliConfig) -> Result<()> {
    println!("{} Validating configuration", "→".bright_blue());

    match config.validate() {
        Ok(_) => {
            println!("{} Configuration is valid", "✓".green());
            Ok(())
        }
        Err(e) => {
            println!("{} Configuration validation failed: {}", "✗".red(), e);
            Err(e)
        }
    }
}

async fn generate_config(output_path: Option<&str>) -> Result<()> {
    let default_config = CliConfig::default();
    let output_path = output_path.unwrap_or("tessera.toml");

    println!("{} Generating default configuration", "→".bright_blue());
    println!("Output: {}", output_path.cyan());

    default_config.save(output_path).await?;

    println!("{} Configuration generated successfully", "✓".green());
    Ok(())
}
