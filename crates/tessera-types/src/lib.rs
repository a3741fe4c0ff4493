//! Core type definitions for the tessera bring-up layer
//!
//! This crate holds the configuration surface, device identifiers and the
//! error taxonomy shared by every other tessera crate. It is kept free of
//! runtime dependencies so that the interface and engine crates can depend
//! on it without cycles.

pub mod config;
pub mod devices;
pub mod errors;

pub use config::*;
pub use devices::*;
pub use errors::*;

/// Result type used throughout tessera
pub type Result<T> = std::result::Result<T, TesseraError>;
