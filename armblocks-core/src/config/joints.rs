//! Joint registry
//!
//! Static per-joint configuration: identity, kind and limits. The registry
//! is validated once when it is built and is read-only afterwards.

use core::fmt;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Maximum joint name length
pub const MAX_LABEL_LEN: usize = 16;

/// Maximum joints per arm
pub const MAX_JOINTS: usize = 8;

/// Lowest angle a revolute joint accepts (degrees)
pub const MIN_DEGREES: f32 = 0.0;

/// Highest angle a revolute joint accepts (degrees)
pub const MAX_DEGREES: f32 = 360.0;

/// Joint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    /// Bounded-angle joint driven by position
    #[default]
    Revolute,
    /// Unbounded joint driven by a speed setpoint
    Continuous,
}

/// Lower/upper bound for a revolute joint (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub lower: f32,
    pub upper: f32,
}

impl JointLimit {
    /// Check if an angle is within the limit
    pub fn contains(&self, degrees: f32) -> bool {
        degrees >= self.lower && degrees <= self.upper
    }

    fn is_valid(&self) -> bool {
        self.lower.is_finite()
            && self.upper.is_finite()
            && self.lower >= MIN_DEGREES
            && self.upper <= MAX_DEGREES
            && self.lower <= self.upper
    }
}

/// Joint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Joint name (e.g. "base", "gripper")
    pub name: String<MAX_LABEL_LEN>,
    /// Servo bus address
    pub servo_id: u8,
    /// Joint kind
    #[serde(default)]
    pub kind: JointKind,
    /// Optional angle limit (revolute only)
    #[serde(default)]
    pub limit: Option<JointLimit>,
    /// Canonical home angle used by the homing command
    #[serde(default)]
    pub home: Option<f32>,
}

impl JointConfig {
    /// Create a revolute joint with no limit or home angle
    pub fn revolute(name: &str, servo_id: u8) -> Self {
        Self {
            name: label(name),
            servo_id,
            kind: JointKind::Revolute,
            limit: None,
            home: None,
        }
    }

    /// Create a continuous (wheel mode) joint
    pub fn continuous(name: &str, servo_id: u8) -> Self {
        Self {
            kind: JointKind::Continuous,
            ..Self::revolute(name, servo_id)
        }
    }

    /// Set the home angle
    pub fn with_home(mut self, degrees: f32) -> Self {
        self.home = Some(degrees);
        self
    }

    /// Set the angle limit
    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.limit = Some(JointLimit { lower, upper });
        self
    }

    /// Check if this joint is position controlled
    pub fn is_revolute(&self) -> bool {
        self.kind == JointKind::Revolute
    }

    /// Check if an angle is acceptable for this joint
    ///
    /// Continuous joints never accept angles.
    pub fn accepts(&self, degrees: f32) -> bool {
        if !self.is_revolute() || !(MIN_DEGREES..=MAX_DEGREES).contains(&degrees) {
            return false;
        }
        self.limit.map_or(true, |limit| limit.contains(degrees))
    }
}

/// Truncating label constructor
fn label(name: &str) -> String<MAX_LABEL_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No joints configured
    NoJoints,
    /// More than [`MAX_JOINTS`] joints configured
    TooManyJoints,
    /// Servo id 0 is reserved
    InvalidServoId,
    /// Two joints share a servo id
    DuplicateServoId(u8),
    /// Two joints share a name
    DuplicateName(u8),
    /// A continuous joint has an angle limit
    LimitOnContinuous(u8),
    /// Limit bounds outside [0, 360] or inverted
    InvalidLimit(u8),
    /// Home angle not accepted by the joint
    HomeOutOfRange(u8),
    /// Gripper names a joint that does not exist
    UnknownGripper,
    /// Gripper joint is not revolute
    GripperNotRevolute,
    /// Gripper open/close angle out of range
    GripperAngleOutOfRange,
    /// Frame period of zero
    InvalidTiming,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoJoints => write!(f, "no joints configured"),
            ConfigError::TooManyJoints => write!(f, "more than {} joints configured", MAX_JOINTS),
            ConfigError::InvalidServoId => write!(f, "servo id 0 is reserved"),
            ConfigError::DuplicateServoId(id) => write!(f, "servo id {} used twice", id),
            ConfigError::DuplicateName(id) => write!(f, "joint name of servo {} used twice", id),
            ConfigError::LimitOnContinuous(id) => {
                write!(f, "continuous joint {} cannot have a limit", id)
            }
            ConfigError::InvalidLimit(id) => write!(f, "joint {} has an invalid limit", id),
            ConfigError::HomeOutOfRange(id) => write!(f, "joint {} home angle out of range", id),
            ConfigError::UnknownGripper => write!(f, "gripper joint not found"),
            ConfigError::GripperNotRevolute => write!(f, "gripper joint must be revolute"),
            ConfigError::GripperAngleOutOfRange => write!(f, "gripper angle out of range"),
            ConfigError::InvalidTiming => write!(f, "frame period must be non-zero"),
        }
    }
}

/// Validated, immutable set of joints
#[derive(Debug, Clone, PartialEq)]
pub struct JointRegistry {
    joints: Vec<JointConfig, MAX_JOINTS>,
}

impl JointRegistry {
    /// Validate and build a registry
    pub fn new(joints: &[JointConfig]) -> Result<Self, ConfigError> {
        if joints.is_empty() {
            return Err(ConfigError::NoJoints);
        }
        if joints.len() > MAX_JOINTS {
            return Err(ConfigError::TooManyJoints);
        }

        let mut out: Vec<JointConfig, MAX_JOINTS> = Vec::new();
        for joint in joints {
            let id = joint.servo_id;
            if id == 0 {
                return Err(ConfigError::InvalidServoId);
            }
            if out.iter().any(|j| j.servo_id == id) {
                return Err(ConfigError::DuplicateServoId(id));
            }
            if out.iter().any(|j| j.name == joint.name) {
                return Err(ConfigError::DuplicateName(id));
            }
            if let Some(limit) = joint.limit {
                if !joint.is_revolute() {
                    return Err(ConfigError::LimitOnContinuous(id));
                }
                if !limit.is_valid() {
                    return Err(ConfigError::InvalidLimit(id));
                }
            }
            if let Some(home) = joint.home {
                if !joint.accepts(home) {
                    return Err(ConfigError::HomeOutOfRange(id));
                }
            }
            out.push(joint.clone())
                .map_err(|_| ConfigError::TooManyJoints)?;
        }

        Ok(Self { joints: out })
    }

    /// Look up a joint by servo id
    pub fn get(&self, servo_id: u8) -> Option<&JointConfig> {
        self.joints.iter().find(|j| j.servo_id == servo_id)
    }

    /// Look up a joint by name
    pub fn by_name(&self, name: &str) -> Option<&JointConfig> {
        self.joints.iter().find(|j| j.name.as_str() == name)
    }

    /// Iterate over all joints in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &JointConfig> {
        self.joints.iter()
    }

    /// Iterate over revolute joints
    pub fn revolute(&self) -> impl Iterator<Item = &JointConfig> {
        self.joints.iter().filter(|j| j.is_revolute())
    }

    /// Iterate over continuous joints
    pub fn continuous(&self) -> impl Iterator<Item = &JointConfig> {
        self.joints.iter().filter(|j| !j.is_revolute())
    }

    /// Number of joints
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Always false for a validated registry
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}
