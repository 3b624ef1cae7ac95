//! Block execution engine
//!
//! Interprets a [`Program`](crate::program::Program) against an
//! [`Actuator`](crate::traits::Actuator) with cooperative cancellation.

pub mod cancel;
pub mod executor;
pub mod state;

pub use cancel::CancelToken;
pub use executor::{Engine, EngineConfig, RunError, RunReport};
pub use state::{FailReason, RunEvent, RunState};
