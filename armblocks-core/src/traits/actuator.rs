//! Actuator capability
//!
//! The surface the execution engine drives. The joint state synchronizer
//! implements it; tests substitute a recording double.

use core::fmt;

use super::bus::BusError;

/// One joint goal in a multi-joint move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTarget {
    /// Servo bus address of the joint
    pub servo_id: u8,
    /// Goal angle (degrees)
    pub degrees: f32,
}

impl JointTarget {
    pub const fn new(servo_id: u8, degrees: f32) -> Self {
        Self { servo_id, degrees }
    }
}

/// Reason an operation was refused without touching any state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Operation needs a live connection
    NotConnected,
    /// No joint is designated as the gripper
    NoGripper,
}

/// Errors reported by an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The link to the hardware is gone; the caller must reconnect
    ConnectionLost,
    /// A hardware write failed but the link is still usable
    WriteFailed(BusError),
    /// The operation does not apply in the current state
    Refused(Refusal),
}

impl ActuatorError {
    /// Check if this error must abort a running program
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActuatorError::ConnectionLost)
    }
}

impl From<BusError> for ActuatorError {
    fn from(err: BusError) -> Self {
        if err.is_link_lost() {
            ActuatorError::ConnectionLost
        } else {
            ActuatorError::WriteFailed(err)
        }
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorError::ConnectionLost => write!(f, "connection lost"),
            ActuatorError::WriteFailed(err) => write!(f, "write failed: {}", err),
            ActuatorError::Refused(Refusal::NotConnected) => write!(f, "refused: not connected"),
            ActuatorError::Refused(Refusal::NoGripper) => write!(f, "refused: no gripper"),
        }
    }
}

/// Actuation capability consumed by the execution engine
///
/// Every call is awaited to completion before the next one is issued.
#[allow(async_fn_in_trait)]
pub trait Actuator {
    /// Bring up the hardware link
    async fn connect(&self) -> Result<(), ActuatorError>;

    /// Tear down the hardware link (best-effort)
    async fn disconnect(&self) -> Result<(), ActuatorError>;

    /// Move every revolute joint to its home angle
    async fn home_robot(&self) -> Result<(), ActuatorError>;

    /// Move the gripper to its open angle
    async fn open_gripper(&self) -> Result<(), ActuatorError>;

    /// Move the gripper to its close angle
    async fn close_gripper(&self) -> Result<(), ActuatorError>;

    /// Move one or more joints; multi-joint moves start together
    async fn update_joints_degrees(&self, targets: &[JointTarget]) -> Result<(), ActuatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_conversion() {
        assert_eq!(
            ActuatorError::from(BusError::Disconnected),
            ActuatorError::ConnectionLost
        );
        assert_eq!(
            ActuatorError::from(BusError::Timeout { servo_id: 3 }),
            ActuatorError::WriteFailed(BusError::Timeout { servo_id: 3 })
        );
    }

    #[test]
    fn test_only_connection_loss_is_fatal() {
        assert!(ActuatorError::ConnectionLost.is_fatal());
        assert!(!ActuatorError::WriteFailed(BusError::Io).is_fatal());
        assert!(!ActuatorError::Refused(Refusal::NotConnected).is_fatal());
    }
}
