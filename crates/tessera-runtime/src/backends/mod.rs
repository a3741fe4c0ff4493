//! Collaborator implementations

#[cfg(feature = "simulated")]
pub mod simulated;

#[cfg(feature = "simulated")]
pub use self::simulated::*;
