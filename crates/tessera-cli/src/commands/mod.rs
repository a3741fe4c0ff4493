//! CLI command implementations

pub mod bringup;
pub mod config_cmd;
pub mod plan;

// Re-exports
pub use bringup::BringupCommand;
pub use config_cmd::ConfigCommand;
pub use plan::PlanCommand;
