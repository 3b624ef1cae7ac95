//! Simulated servo bus
//!
//! In-memory twin of a Feetech-style serial bus. Registers update as soon as
//! they are written, so a position read right after a write returns the
//! commanded value. Used by the host when no hardware is attached and by
//! tests, which can inject failures and inspect the transaction log.

use log::trace;

use crate::config::JointRegistry;
use crate::traits::{BusError, ServoBus, ServoMode};

/// Position every seeded servo starts at (180 degrees)
pub const SEED_POSITION: u16 = 2048;

/// One recorded bus transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Open,
    Close,
    SetMode(u8, ServoMode),
    SetTorque(u8, bool),
    ReadPosition(u8),
    WritePosition(u8, u16),
    ReadSpeed(u8),
    WriteSpeed(u8, i16),
    SyncWritePositions(Vec<(u8, u16)>),
    SyncWriteSpeeds(Vec<(u8, i16)>),
}

/// Register file of one simulated servo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoRegisters {
    pub id: u8,
    pub mode: ServoMode,
    pub torque: bool,
    pub position: u16,
    pub speed: i16,
}

impl ServoRegisters {
    fn new(id: u8, position: u16) -> Self {
        Self {
            id,
            mode: ServoMode::Position,
            torque: false,
            position,
            speed: 0,
        }
    }
}

/// Injected failure modes
#[derive(Debug, Default, Clone)]
struct Faults {
    refuse_open: bool,
    failing_servos: Vec<u8>,
    fail_torque: bool,
    fail_reads: bool,
    drop_link_after: Option<usize>,
}

/// In-memory servo bus
#[derive(Debug, Default)]
pub struct SimulatedBus {
    servos: Vec<ServoRegisters>,
    open: bool,
    link_dropped: bool,
    transactions: usize,
    faults: Faults,
    log: Vec<BusOp>,
}

impl SimulatedBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with one servo per registry joint at [`SEED_POSITION`]
    pub fn for_registry(registry: &JointRegistry) -> Self {
        registry
            .iter()
            .fold(Self::new(), |bus, joint| bus.with_servo(joint.servo_id, SEED_POSITION))
    }

    /// Add (or reseed) a servo
    pub fn with_servo(mut self, id: u8, position: u16) -> Self {
        match self.servos.iter_mut().find(|s| s.id == id) {
            Some(servo) => servo.position = position,
            None => self.servos.push(ServoRegisters::new(id, position)),
        }
        self
    }

    /// Make `open` fail
    pub fn refuse_open(mut self) -> Self {
        self.faults.refuse_open = true;
        self
    }

    /// Make every transaction addressed to `id` time out
    pub fn fail_servo(mut self, id: u8) -> Self {
        self.faults.failing_servos.push(id);
        self
    }

    /// Make every torque write fail
    pub fn fail_torque(mut self) -> Self {
        self.faults.fail_torque = true;
        self
    }

    /// Make every position/speed read fail
    pub fn fail_reads(mut self) -> Self {
        self.faults.fail_reads = true;
        self
    }

    /// Report `Disconnected` for every transaction after the first `count`
    pub fn drop_link_after(mut self, count: usize) -> Self {
        self.faults.drop_link_after = Some(count);
        self
    }

    /// Transactions seen so far, in order
    pub fn ops(&self) -> &[BusOp] {
        &self.log
    }

    /// Forget recorded transactions
    pub fn clear_ops(&mut self) {
        self.log.clear();
    }

    /// Registers of one servo
    pub fn servo(&self, id: u8) -> Option<&ServoRegisters> {
        self.servos.iter().find(|s| s.id == id)
    }

    /// Check if the port is open
    pub fn is_open(&self) -> bool {
        self.open && !self.link_dropped
    }

    /// Record a transaction and apply link-level faults
    fn transact(&mut self, op: BusOp) -> Result<(), BusError> {
        trace!("sim bus: {:?}", op);
        let is_open = matches!(op, BusOp::Open);
        self.log.push(op);
        self.transactions += 1;

        if let Some(limit) = self.faults.drop_link_after {
            if self.transactions > limit {
                self.link_dropped = true;
            }
        }
        if self.link_dropped || (!self.open && !is_open) {
            return Err(BusError::Disconnected);
        }
        Ok(())
    }

    fn addressed(&mut self, id: u8) -> Result<&mut ServoRegisters, BusError> {
        if self.faults.failing_servos.contains(&id) {
            return Err(BusError::Timeout { servo_id: id });
        }
        self.servos
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(BusError::NoResponse { servo_id: id })
    }

    fn check_read(&self) -> Result<(), BusError> {
        if self.faults.fail_reads {
            return Err(BusError::Io);
        }
        Ok(())
    }
}

impl ServoBus for SimulatedBus {
    async fn open(&mut self) -> Result<(), BusError> {
        self.transact(BusOp::Open)?;
        if self.faults.refuse_open {
            return Err(BusError::Io);
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        let result = self.transact(BusOp::Close);
        self.open = false;
        result
    }

    async fn set_mode(&mut self, servo_id: u8, mode: ServoMode) -> Result<(), BusError> {
        self.transact(BusOp::SetMode(servo_id, mode))?;
        self.addressed(servo_id)?.mode = mode;
        Ok(())
    }

    async fn set_torque(&mut self, servo_id: u8, enabled: bool) -> Result<(), BusError> {
        self.transact(BusOp::SetTorque(servo_id, enabled))?;
        if self.faults.fail_torque {
            return Err(BusError::Timeout { servo_id });
        }
        self.addressed(servo_id)?.torque = enabled;
        Ok(())
    }

    async fn read_position(&mut self, servo_id: u8) -> Result<u16, BusError> {
        self.transact(BusOp::ReadPosition(servo_id))?;
        self.check_read()?;
        Ok(self.addressed(servo_id)?.position)
    }

    async fn write_position(&mut self, servo_id: u8, position: u16) -> Result<(), BusError> {
        self.transact(BusOp::WritePosition(servo_id, position))?;
        self.addressed(servo_id)?.position = position;
        Ok(())
    }

    async fn read_speed(&mut self, servo_id: u8) -> Result<i16, BusError> {
        self.transact(BusOp::ReadSpeed(servo_id))?;
        self.check_read()?;
        Ok(self.addressed(servo_id)?.speed)
    }

    async fn write_speed(&mut self, servo_id: u8, speed: i16) -> Result<(), BusError> {
        self.transact(BusOp::WriteSpeed(servo_id, speed))?;
        self.addressed(servo_id)?.speed = speed;
        Ok(())
    }

    async fn sync_write_positions(&mut self, targets: &[(u8, u16)]) -> Result<(), BusError> {
        self.transact(BusOp::SyncWritePositions(targets.to_vec()))?;
        // Validate every address before touching any register
        for &(id, _) in targets {
            self.addressed(id)?;
        }
        for &(id, position) in targets {
            self.addressed(id)?.position = position;
        }
        Ok(())
    }

    async fn sync_write_speeds(&mut self, targets: &[(u8, i16)]) -> Result<(), BusError> {
        self.transact(BusOp::SyncWriteSpeeds(targets.to_vec()))?;
        for &(id, _) in targets {
            self.addressed(id)?;
        }
        for &(id, speed) in targets {
            self.addressed(id)?.speed = speed;
        }
        Ok(())
    }
}
