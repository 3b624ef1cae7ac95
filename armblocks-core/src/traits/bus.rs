//! Servo bus trait
//!
//! Abstracts over the transport that turns a servo id and a register write
//! into bytes on a wire (Feetech STS/SCS half-duplex UART, a USB bridge, or
//! the in-memory twin). Positions are raw device units, speeds are signed
//! device units.

use core::fmt;

/// Servo operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoMode {
    /// Closed-loop position control
    Position,
    /// Continuous rotation driven by a speed setpoint
    Wheel,
}

/// Errors reported by a servo bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The link itself is gone (port closed, adapter unplugged)
    Disconnected,
    /// A servo did not answer in time
    Timeout { servo_id: u8 },
    /// A servo answered with an error status or garbage
    NoResponse { servo_id: u8 },
    /// Low-level I/O failure not attributable to one servo
    Io,
}

impl BusError {
    /// Check if this error means the link is unusable
    pub fn is_link_lost(&self) -> bool {
        matches!(self, BusError::Disconnected)
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Disconnected => write!(f, "bus disconnected"),
            BusError::Timeout { servo_id } => write!(f, "servo {} timed out", servo_id),
            BusError::NoResponse { servo_id } => write!(f, "servo {} not responding", servo_id),
            BusError::Io => write!(f, "bus I/O error"),
        }
    }
}

/// Servo bus transport
///
/// Every call is one bus transaction. Callers serialize access; an
/// implementation never sees two transactions in flight.
#[allow(async_fn_in_trait)]
pub trait ServoBus {
    /// Open the underlying port
    async fn open(&mut self) -> Result<(), BusError>;

    /// Close the underlying port
    async fn close(&mut self) -> Result<(), BusError>;

    /// Select position or wheel mode
    async fn set_mode(&mut self, servo_id: u8, mode: ServoMode) -> Result<(), BusError>;

    /// Enable or disable holding torque
    async fn set_torque(&mut self, servo_id: u8, enabled: bool) -> Result<(), BusError>;

    /// Read the present position (device units)
    async fn read_position(&mut self, servo_id: u8) -> Result<u16, BusError>;

    /// Write a goal position (device units)
    async fn write_position(&mut self, servo_id: u8, position: u16) -> Result<(), BusError>;

    /// Read the present wheel speed
    async fn read_speed(&mut self, servo_id: u8) -> Result<i16, BusError>;

    /// Write a wheel speed setpoint
    async fn write_speed(&mut self, servo_id: u8, speed: i16) -> Result<(), BusError>;

    /// Write goal positions for several servos in one synchronized packet
    ///
    /// All addressed servos start moving together.
    async fn sync_write_positions(&mut self, targets: &[(u8, u16)]) -> Result<(), BusError>;

    /// Write wheel speeds for several servos in one synchronized packet
    async fn sync_write_speeds(&mut self, targets: &[(u8, i16)]) -> Result<(), BusError>;
}
