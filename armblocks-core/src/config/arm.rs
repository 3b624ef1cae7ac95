//! Arm-level configuration
//!
//! Groups the joint list with the settings that apply to the arm as a whole:
//! gripper designation, settle delay and interpolation frame period.

use heapless::String;
use serde::{Deserialize, Serialize};

use super::joints::{ConfigError, JointConfig, JointRegistry, MAX_LABEL_LEN};

/// Default gripper open angle (degrees)
pub const DEFAULT_GRIPPER_OPEN: f32 = 180.0;

/// Default gripper close angle (degrees)
pub const DEFAULT_GRIPPER_CLOSE: f32 = 0.0;

/// Default pause between top-level instructions (ms)
pub const DEFAULT_SETTLE_MS: u32 = 500;

/// Default interpolation frame period (ms), roughly one display refresh
pub const DEFAULT_FRAME_MS: u32 = 16;

/// Arm-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmSettings {
    /// Name of the joint that acts as the gripper
    pub gripper: Option<String<MAX_LABEL_LEN>>,
    /// Gripper open angle (degrees)
    pub gripper_open: f32,
    /// Gripper close angle (degrees)
    pub gripper_close: f32,
    /// Inter-command settle delay (ms)
    pub settle_ms: u32,
    /// Interpolation tick period (ms)
    pub frame_ms: u32,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            gripper: None,
            gripper_open: DEFAULT_GRIPPER_OPEN,
            gripper_close: DEFAULT_GRIPPER_CLOSE,
            settle_ms: DEFAULT_SETTLE_MS,
            frame_ms: DEFAULT_FRAME_MS,
        }
    }
}

/// Resolved gripper designation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperSettings {
    /// Servo id of the gripper joint
    pub servo_id: u8,
    /// Open angle (degrees)
    pub open: f32,
    /// Close angle (degrees)
    pub close: f32,
}

/// Complete arm configuration as stored on disk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArmConfig {
    #[serde(default)]
    pub arm: ArmSettings,
    #[serde(rename = "joint", default)]
    pub joints: Vec<JointConfig>,
}

impl ArmConfig {
    /// Build the joint registry
    pub fn registry(&self) -> Result<JointRegistry, ConfigError> {
        JointRegistry::new(&self.joints)
    }

    /// Resolve the gripper joint against a registry
    ///
    /// Returns `Ok(None)` when no gripper is configured.
    pub fn gripper(&self, registry: &JointRegistry) -> Result<Option<GripperSettings>, ConfigError> {
        let Some(name) = &self.arm.gripper else {
            return Ok(None);
        };

        let joint = registry
            .by_name(name.as_str())
            .ok_or(ConfigError::UnknownGripper)?;
        if !joint.is_revolute() {
            return Err(ConfigError::GripperNotRevolute);
        }
        if !joint.accepts(self.arm.gripper_open) || !joint.accepts(self.arm.gripper_close) {
            return Err(ConfigError::GripperAngleOutOfRange);
        }

        Ok(Some(GripperSettings {
            servo_id: joint.servo_id,
            open: self.arm.gripper_open,
            close: self.arm.gripper_close,
        }))
    }

    /// Validate everything and return the resolved parts
    pub fn validate(&self) -> Result<(JointRegistry, Option<GripperSettings>), ConfigError> {
        if self.arm.frame_ms == 0 {
            return Err(ConfigError::InvalidTiming);
        }
        let registry = self.registry()?;
        let gripper = self.gripper(&registry)?;
        Ok((registry, gripper))
    }
}
