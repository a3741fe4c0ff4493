//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tessera_types::{Result, TesseraError};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Print `data` as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| TesseraError::serialization(format!("JSON serialization failed: {}", e)))?;
    println!("{}", json);
    Ok(())
}

/// Print a `label: value` line
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", label, value.to_string().cyan());
}

/// Print error with formatting
pub fn print_error(error: &TesseraError) {
    eprintln!("{} {}", "Error:".red().bold(), error);
}
