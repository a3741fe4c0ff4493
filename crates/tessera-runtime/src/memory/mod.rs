//! Device resource ownership and accounting

pub mod guards;
pub mod stats;

pub use guards::*;
pub use stats::*;
