//! Joint state synchronizer
//!
//! Bridges the virtual joint table and the servo bus. Every joint command
//! updates the table first so the animator can show it; when connected the
//! command is also written to the bus and the table snaps to the position
//! read back from the servo.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use heapless::Vec;
use log::{debug, error, info, warn};

use super::table::{JointState, JointTable};
use super::units::{degrees_to_units, units_to_degrees};
use crate::config::{GripperSettings, JointKind, JointRegistry, MAX_JOINTS};
use crate::traits::{
    Actuator, ActuatorError, BusError, JointTarget, Refusal, ServoBus, ServoMode,
};

/// Errors from [`Synchronizer::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The bus could not be opened
    TransportUnavailable(BusError),
    /// Already connected
    AlreadyConnected,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::TransportUnavailable(err) => write!(f, "transport unavailable: {}", err),
            ConnectError::AlreadyConnected => write!(f, "already connected"),
        }
    }
}

/// Result of an emergency stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Torque removed and state reset to the connect-time origin
    Stopped,
    /// Not connected, nothing was changed
    NotConnected,
}

/// Joint state synchronizer
///
/// Sole writer of the [`JointTable`]. Bus access is serialized through an
/// async mutex so at most one transaction is in flight.
pub struct Synchronizer<'a, B: ServoBus> {
    registry: &'a JointRegistry,
    table: &'a JointTable,
    gripper: Option<GripperSettings>,
    bus: Mutex<CriticalSectionRawMutex, B>,
    connected: AtomicBool,
}

impl<'a, B: ServoBus> Synchronizer<'a, B> {
    pub fn new(
        registry: &'a JointRegistry,
        table: &'a JointTable,
        gripper: Option<GripperSettings>,
        bus: B,
    ) -> Self {
        Self {
            registry,
            table,
            gripper,
            bus: Mutex::new(bus),
            connected: AtomicBool::new(false),
        }
    }

    /// Joint table this synchronizer writes
    pub fn table(&self) -> &'a JointTable {
        self.table
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Run a closure against the bus once it is free
    pub async fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        let mut bus = self.bus.lock().await;
        f(&mut bus)
    }

    /// Give the bus back
    pub fn into_bus(self) -> B {
        self.bus.into_inner()
    }

    /// Open the bus and read every joint's starting position
    ///
    /// Only a failure to open the bus fails the whole sequence. A joint that
    /// does not answer starts at 0 degrees.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }

        let mut bus = self.bus.lock().await;
        if let Err(err) = bus.open().await {
            error!("Failed to open servo bus: {}", err);
            return Err(ConnectError::TransportUnavailable(err));
        }

        for joint in self.registry.continuous() {
            let id = joint.servo_id;
            if let Err(err) = init_wheel(&mut *bus, id).await {
                warn!("Joint {} ({}): wheel init failed: {}", joint.name.as_str(), id, err);
            }
            self.table.set_speed(id, 0);
        }

        for joint in self.registry.revolute() {
            let id = joint.servo_id;
            let degrees = match init_position(&mut *bus, id).await {
                Ok(degrees) => degrees,
                Err(err) => {
                    warn!(
                        "Joint {} ({}): position init failed, assuming 0: {}",
                        joint.name.as_str(),
                        id,
                        err
                    );
                    0.0
                }
            };
            debug!("Joint {} ({}) origin {} deg", joint.name.as_str(), id, degrees);
            self.table.set_origin(id, degrees);
        }

        self.connected.store(true, Ordering::Release);
        info!("Connected to {} joints", self.registry.len());
        Ok(())
    }

    /// Release every joint and close the bus
    ///
    /// Best-effort: individual failures are logged and cleanup continues.
    pub async fn disconnect(&self) {
        let mut bus = self.bus.lock().await;

        if self.connected.swap(false, Ordering::AcqRel) {
            for joint in self.registry.iter() {
                let id = joint.servo_id;
                let result = match joint.kind {
                    JointKind::Revolute => bus.set_torque(id, false).await,
                    JointKind::Continuous => bus.write_speed(id, 0).await,
                };
                if let Err(err) = result {
                    warn!("Joint {} release failed: {}", id, err);
                }
            }
        }

        if let Err(err) = bus.close().await {
            warn!("Failed to close servo bus: {}", err);
        }
        info!("Disconnected");
    }

    /// Move one joint
    pub async fn update_degrees(&self, servo_id: u8, degrees: f32) -> Result<(), ActuatorError> {
        self.update_joints_degrees(&[JointTarget::new(servo_id, degrees)])
            .await
    }

    /// Move several joints together
    ///
    /// Entries for unknown or continuous joints, or with an angle the joint
    /// does not accept, are skipped; the rest still apply. If the bus write
    /// fails without losing the link, every joint in the call is put back
    /// the way it was.
    pub async fn update_joints_degrees(&self, targets: &[JointTarget]) -> Result<(), ActuatorError> {
        let mut accepted: Vec<JointTarget, MAX_JOINTS> = Vec::new();
        let mut previous: Vec<JointState, MAX_JOINTS> = Vec::new();

        for target in targets {
            let id = target.servo_id;
            let Some(joint) = self.registry.get(id) else {
                warn!("Skipping unknown joint {}", id);
                continue;
            };
            if !joint.accepts(target.degrees) {
                warn!(
                    "Skipping joint {} ({}): {} deg out of range",
                    joint.name.as_str(),
                    id,
                    target.degrees
                );
                continue;
            }

            // Later entries for the same joint win
            if let Some(existing) = accepted.iter_mut().find(|t| t.servo_id == id) {
                existing.degrees = target.degrees;
            } else {
                if let Some(state) = self.table.joint(id) {
                    let _ = previous.push(state);
                }
                let _ = accepted.push(*target);
            }
            self.table.set_target(id, target.degrees);
        }

        if accepted.is_empty() {
            return Ok(());
        }

        if !self.is_connected() {
            debug!("Not connected, animating {} joints", accepted.len());
            self.table.request_motion();
            return Ok(());
        }

        let mut bus = self.bus.lock().await;
        let written = match accepted.as_slice() {
            [single] => {
                bus.write_position(single.servo_id, degrees_to_units(single.degrees))
                    .await
            }
            many => {
                let units: Vec<(u8, u16), MAX_JOINTS> = many
                    .iter()
                    .map(|t| (t.servo_id, degrees_to_units(t.degrees)))
                    .collect();
                bus.sync_write_positions(&units).await
            }
        };
        if let Err(err) = written {
            if err.is_link_lost() {
                self.link_lost();
                self.table.request_motion();
                return Err(ActuatorError::ConnectionLost);
            }
            warn!("Position write failed, restoring {} joints: {}", previous.len(), err);
            self.table.restore(&previous);
            return Err(ActuatorError::WriteFailed(err));
        }

        for target in &accepted {
            let degrees = match bus.read_position(target.servo_id).await {
                Ok(units) => units_to_degrees(units),
                Err(err) if err.is_link_lost() => {
                    self.link_lost();
                    self.table.request_motion();
                    return Err(ActuatorError::ConnectionLost);
                }
                Err(err) => {
                    debug!("Readback of joint {} failed: {}", target.servo_id, err);
                    target.degrees
                }
            };
            self.table.snap(target.servo_id, degrees);
        }

        Ok(())
    }

    /// Set one continuous joint's speed
    pub async fn update_speed(&self, servo_id: u8, speed: i16) -> Result<(), ActuatorError> {
        self.update_speed_batch(&[(servo_id, speed)]).await
    }

    /// Set several continuous joints' speeds
    ///
    /// A failed write resets the affected speeds to 0 and is not reported;
    /// only a lost link is.
    pub async fn update_speed_batch(&self, speeds: &[(u8, i16)]) -> Result<(), ActuatorError> {
        let mut accepted: Vec<(u8, i16), MAX_JOINTS> = Vec::new();

        for &(id, speed) in speeds {
            match self.registry.get(id) {
                Some(joint) if !joint.is_revolute() => {}
                Some(_) => {
                    warn!("Skipping speed for revolute joint {}", id);
                    continue;
                }
                None => {
                    warn!("Skipping speed for unknown joint {}", id);
                    continue;
                }
            }
            if let Some(existing) = accepted.iter_mut().find(|(i, _)| *i == id) {
                existing.1 = speed;
            } else {
                let _ = accepted.push((id, speed));
            }
            self.table.set_speed(id, speed);
        }

        if accepted.is_empty() || !self.is_connected() {
            return Ok(());
        }

        let mut bus = self.bus.lock().await;
        let written = match accepted.as_slice() {
            [(id, speed)] => bus.write_speed(*id, *speed).await,
            many => bus.sync_write_speeds(many).await,
        };
        if let Err(err) = written {
            for &(id, _) in &accepted {
                self.table.set_speed(id, 0);
            }
            if err.is_link_lost() {
                self.link_lost();
                return Err(ActuatorError::ConnectionLost);
            }
            warn!("Speed write failed, speeds reset: {}", err);
        }
        Ok(())
    }

    /// Move revolute joints to their home angles, one joint at a time
    ///
    /// Joints without a configured home angle stay where they are. A write
    /// failure on one joint does not stop the others; the first one is
    /// reported once all joints have been tried.
    pub async fn home_robot(&self) -> Result<(), ActuatorError> {
        if !self.is_connected() {
            warn!("Home refused: not connected");
            return Err(ActuatorError::Refused(Refusal::NotConnected));
        }

        info!("Homing");
        let mut first_failure = None;
        for joint in self.registry.revolute() {
            let Some(home) = joint.home else {
                continue;
            };
            match self.update_degrees(joint.servo_id, home).await {
                Ok(()) => {}
                Err(ActuatorError::ConnectionLost) => return Err(ActuatorError::ConnectionLost),
                Err(err) => {
                    warn!("Homing joint {} failed: {}", joint.name.as_str(), err);
                    first_failure.get_or_insert(err);
                }
            }
        }

        first_failure.map_or(Ok(()), Err)
    }

    /// Remove torque and return the table to the connect-time origin
    ///
    /// Never fails: write errors are logged and ignored.
    pub async fn emergency_stop(&self) -> StopOutcome {
        if !self.is_connected() {
            warn!("Emergency stop ignored: not connected");
            return StopOutcome::NotConnected;
        }

        error!("EMERGENCY STOP");
        {
            let mut bus = self.bus.lock().await;
            for joint in self.registry.iter() {
                let id = joint.servo_id;
                let result = match joint.kind {
                    JointKind::Revolute => bus.set_torque(id, false).await,
                    JointKind::Continuous => bus.write_speed(id, 0).await,
                };
                if let Err(err) = result {
                    warn!("Emergency stop write to joint {} failed: {}", id, err);
                }
            }
        }

        self.table.reset_to_origin();
        StopOutcome::Stopped
    }

    pub async fn open_gripper(&self) -> Result<(), ActuatorError> {
        let gripper = self.gripper()?;
        self.update_degrees(gripper.servo_id, gripper.open).await
    }

    pub async fn close_gripper(&self) -> Result<(), ActuatorError> {
        let gripper = self.gripper()?;
        self.update_degrees(gripper.servo_id, gripper.close).await
    }

    fn gripper(&self) -> Result<GripperSettings, ActuatorError> {
        self.gripper
            .ok_or(ActuatorError::Refused(Refusal::NoGripper))
    }

    fn link_lost(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            error!("Servo bus connection lost");
        }
    }
}

async fn init_wheel<B: ServoBus>(bus: &mut B, id: u8) -> Result<(), BusError> {
    bus.set_mode(id, ServoMode::Wheel).await?;
    bus.write_speed(id, 0).await
}

async fn init_position<B: ServoBus>(bus: &mut B, id: u8) -> Result<f32, BusError> {
    bus.set_mode(id, ServoMode::Position).await?;
    bus.set_torque(id, true).await?;
    let units = bus.read_position(id).await?;
    Ok(units_to_degrees(units))
}

impl<B: ServoBus> Actuator for Synchronizer<'_, B> {
    async fn connect(&self) -> Result<(), ActuatorError> {
        match Synchronizer::connect(self).await {
            Ok(()) | Err(ConnectError::AlreadyConnected) => Ok(()),
            Err(ConnectError::TransportUnavailable(_)) => Err(ActuatorError::ConnectionLost),
        }
    }

    async fn disconnect(&self) -> Result<(), ActuatorError> {
        Synchronizer::disconnect(self).await;
        Ok(())
    }

    async fn home_robot(&self) -> Result<(), ActuatorError> {
        Synchronizer::home_robot(self).await
    }

    async fn open_gripper(&self) -> Result<(), ActuatorError> {
        Synchronizer::open_gripper(self).await
    }

    async fn close_gripper(&self) -> Result<(), ActuatorError> {
        Synchronizer::close_gripper(self).await
    }

    async fn update_joints_degrees(&self, targets: &[JointTarget]) -> Result<(), ActuatorError> {
        Synchronizer::update_joints_degrees(self, targets).await
    }
}
