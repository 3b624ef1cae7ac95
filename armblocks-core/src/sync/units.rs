//! Degree / device-unit conversion
//!
//! Servos report and accept positions as 12-bit encoder counts over one
//! revolution. The scale is linear.

/// Encoder counts per full revolution
pub const UNITS_PER_REVOLUTION: u16 = 4096;

/// Encoder counts per degree
pub const UNITS_PER_DEGREE: f32 = UNITS_PER_REVOLUTION as f32 / 360.0;

/// Degrees per encoder count (45/512, exact in binary)
const DEGREES_PER_UNIT: f32 = 360.0 / UNITS_PER_REVOLUTION as f32;

/// Highest position a servo accepts
pub const MAX_UNITS: u16 = UNITS_PER_REVOLUTION - 1;

/// Convert degrees to device units
///
/// Rounds to the nearest count and clamps to `0..=MAX_UNITS`, so 360 degrees
/// lands on the last count rather than wrapping to zero.
pub fn degrees_to_units(degrees: f32) -> u16 {
    if !degrees.is_finite() || degrees <= 0.0 {
        return 0;
    }
    let units = (degrees / DEGREES_PER_UNIT + 0.5) as u32;
    units.min(MAX_UNITS as u32) as u16
}

/// Convert device units to degrees
pub fn units_to_degrees(units: u16) -> f32 {
    units.min(MAX_UNITS) as f32 * DEGREES_PER_UNIT
}
