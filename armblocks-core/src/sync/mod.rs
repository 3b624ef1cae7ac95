//! Joint state synchronization
//!
//! The joint table, the interpolation task that animates it, and the
//! synchronizer that keeps it in step with the servo bus.

pub mod animation;
pub mod sim;
pub mod synchronizer;
pub mod table;
pub mod units;

pub use animation::Animator;
pub use sim::{BusOp, SimulatedBus};
pub use synchronizer::{ConnectError, StopOutcome, Synchronizer};
pub use table::{JointState, JointTable, SNAP_EPSILON, STEP_DEGREES};
pub use units::{degrees_to_units, units_to_degrees, UNITS_PER_DEGREE};
