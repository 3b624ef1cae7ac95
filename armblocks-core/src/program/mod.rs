//! Block programs
//!
//! Typed program forest, the injected block registry and the JSON loader
//! that turns editor documents into programs.

pub mod block;
pub mod error;
pub mod loader;
pub mod registry;

pub use block::{Block, BlockKind, Program};
pub use error::{Field, ValidationError, ValidationErrorKind};
pub use loader::ProgramLoader;
pub use registry::{BlockDefinition, BlockRegistry, Operation, ParamSpec, ParamType};
