//! Configuration types
//!
//! Joint registry and arm-level settings. Loaded once at startup and never
//! mutated afterwards.

pub mod arm;
pub mod joints;

pub use arm::*;
pub use joints::*;
