//! # Tessera CLI Library
//!
//! Command-line front end for capacity planning and simulated bring-up.
//!
//! ## Commands
//!
//! - `plan`: Print per-token cache costs and the token budget
//! - `bringup`: Run a full device bring-up against the simulated platform
//! - `config`: Show, validate or generate the configuration file

pub mod commands;
pub mod config;
pub mod output;
pub mod utils;

// Re-exports
pub use config::CliConfig;
