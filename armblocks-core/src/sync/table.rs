//! Shared joint state table
//!
//! One [`JointState`] per configured joint. The synchronizer is the only
//! writer; renderers and the engine read copies through [`JointTable::snapshot`].
//! The interpolation tick lives here so it runs under the same lock as the
//! writers.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use heapless::Vec;

use super::animation::Animator;
use crate::config::{JointKind, JointRegistry, MAX_JOINTS};

/// Largest change applied to one joint per tick (degrees)
pub const STEP_DEGREES: f32 = 2.0;

/// Remaining distance below which a joint snaps onto its target (degrees)
pub const SNAP_EPSILON: f32 = 0.1;

/// Mutable state of one joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointState {
    /// Servo bus address
    pub servo_id: u8,
    /// Joint kind
    pub kind: JointKind,
    /// Displayed angle (revolute only, always 0 for continuous joints)
    pub degrees: f32,
    /// Goal angle (revolute only)
    pub target_degrees: Option<f32>,
    /// Interpolation in progress
    pub is_moving: bool,
    /// Speed setpoint (continuous only)
    pub speed: i16,
    /// Angle read back at connect time
    pub connected_origin: f32,
}

impl JointState {
    fn new(servo_id: u8, kind: JointKind, home: Option<f32>) -> Self {
        let home = match kind {
            JointKind::Revolute => home,
            JointKind::Continuous => None,
        };
        Self {
            servo_id,
            kind,
            degrees: home.unwrap_or(0.0),
            target_degrees: home,
            is_moving: false,
            speed: 0,
            connected_origin: 0.0,
        }
    }

    /// Advance one interpolation step, returns true while still moving
    fn step(&mut self) -> bool {
        if !self.is_moving {
            return false;
        }
        let Some(target) = self.target_degrees else {
            self.is_moving = false;
            return false;
        };

        let delta = target - self.degrees;
        if delta.abs() < SNAP_EPSILON {
            self.degrees = target;
            self.is_moving = false;
            return false;
        }

        self.degrees += delta.clamp(-STEP_DEGREES, STEP_DEGREES);
        true
    }
}

struct TableInner {
    joints: Vec<JointState, MAX_JOINTS>,
    /// Animator has been woken and has not yet seen the table go idle
    animating: bool,
}

impl TableInner {
    fn find(&mut self, servo_id: u8) -> Option<&mut JointState> {
        self.joints.iter_mut().find(|j| j.servo_id == servo_id)
    }
}

/// Authoritative joint state for one arm
pub struct JointTable {
    inner: Mutex<CriticalSectionRawMutex, RefCell<TableInner>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    animator_claimed: AtomicBool,
}

impl JointTable {
    /// Create the table from a registry, seeding home angles
    pub fn new(registry: &JointRegistry) -> Self {
        let mut joints = Vec::new();
        for joint in registry.iter() {
            // Registry holds at most MAX_JOINTS entries
            let _ = joints.push(JointState::new(joint.servo_id, joint.kind, joint.home));
        }

        Self {
            inner: Mutex::new(RefCell::new(TableInner {
                joints,
                animating: false,
            })),
            wake: Signal::new(),
            animator_claimed: AtomicBool::new(false),
        }
    }

    /// Copy of every joint state, in registry order
    pub fn snapshot(&self) -> Vec<JointState, MAX_JOINTS> {
        self.inner.lock(|cell| cell.borrow().joints.clone())
    }

    /// Copy of one joint state
    pub fn joint(&self, servo_id: u8) -> Option<JointState> {
        self.inner
            .lock(|cell| cell.borrow().joints.iter().find(|j| j.servo_id == servo_id).copied())
    }

    /// Check if any joint is still interpolating
    pub fn is_settled(&self) -> bool {
        self.inner
            .lock(|cell| !cell.borrow().joints.iter().any(|j| j.is_moving))
    }

    /// Check if the animator is currently awake
    pub fn is_animating(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().animating)
    }

    /// Advance every moving joint by one step
    ///
    /// Returns false once nothing is left to animate; the table is then
    /// marked idle and the next motion request wakes the animator again.
    pub fn tick(&self) -> bool {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let mut moving = false;
            for joint in inner.joints.iter_mut() {
                moving |= joint.step();
            }
            if !moving {
                inner.animating = false;
            }
            moving
        })
    }

    /// Claim the single animator handle
    ///
    /// Returns `None` while another handle is alive.
    pub fn animator(&self, frame: Duration) -> Option<Animator<'_>> {
        if self.animator_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Animator::new(self, frame))
    }

    /// Give the handle back, leaving unfinished motion queued for the next one
    pub(crate) fn release_animator(&self) {
        let moving = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let moving = inner.joints.iter().any(|j| j.is_moving);
            inner.animating = moving;
            moving
        });
        self.animator_claimed.store(false, Ordering::Release);
        if moving {
            self.wake.signal(());
        }
    }

    pub(crate) async fn wait_for_motion(&self) {
        self.wake.wait().await
    }

    /// Wake the animator if it is idle and something needs to move
    pub(crate) fn request_motion(&self) {
        let wake = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            if inner.animating || !inner.joints.iter().any(|j| j.is_moving) {
                return false;
            }
            inner.animating = true;
            true
        });
        if wake {
            self.wake.signal(());
        }
    }

    /// Set a new goal angle and start interpolating toward it
    pub(crate) fn set_target(&self, servo_id: u8, degrees: f32) {
        self.update(servo_id, |joint| {
            joint.target_degrees = Some(degrees);
            joint.is_moving = true;
        });
    }

    /// Place a joint exactly at an angle, ending any interpolation
    pub(crate) fn snap(&self, servo_id: u8, degrees: f32) {
        self.update(servo_id, |joint| {
            joint.degrees = degrees;
            joint.target_degrees = Some(degrees);
            joint.is_moving = false;
        });
    }

    /// Record the angle read back at connect time
    pub(crate) fn set_origin(&self, servo_id: u8, degrees: f32) {
        self.update(servo_id, |joint| {
            joint.degrees = degrees;
            joint.target_degrees = Some(degrees);
            joint.connected_origin = degrees;
            joint.is_moving = false;
        });
    }

    pub(crate) fn set_speed(&self, servo_id: u8, speed: i16) {
        self.update(servo_id, |joint| joint.speed = speed);
    }

    /// Put previously captured states back
    pub(crate) fn restore(&self, states: &[JointState]) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            for state in states {
                if let Some(joint) = inner.find(state.servo_id) {
                    *joint = *state;
                }
            }
        });
    }

    /// Return every joint to its connect-time origin and stop all motion
    pub(crate) fn reset_to_origin(&self) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            for joint in inner.joints.iter_mut() {
                if joint.kind == JointKind::Revolute {
                    joint.degrees = joint.connected_origin;
                    joint.target_degrees = Some(joint.connected_origin);
                }
                joint.is_moving = false;
                joint.speed = 0;
            }
        });
    }

    fn update(&self, servo_id: u8, f: impl FnOnce(&mut JointState)) {
        self.inner.lock(|cell| {
            if let Some(joint) = cell.borrow_mut().find(servo_id) {
                f(joint);
            }
        });
    }
}
