//! Hardware abstraction traits
//!
//! These traits define the seams between the engine, the synchronizer and
//! whatever talks to the servos.

pub mod actuator;
pub mod bus;

pub use actuator::{Actuator, ActuatorError, JointTarget, Refusal};
pub use bus::{BusError, ServoBus, ServoMode};
