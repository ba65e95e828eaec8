//! Orientation decoding and reference-frame zeroing.
//!
//! The BNO055 fuses its sensors on-chip and reports orientation twice: as
//! Euler angles (heading, roll, pitch) and as a unit quaternion. This module
//! converts the raw register counts into physical units and applies a
//! user-settable reference so that "zero" can be moved to wherever the sensor
//! happens to be pointing.
//!
//! # Euler angles
//!
//! The corrected angle on each axis is `normalize_angle(raw - offset)`, which
//! always lands in `[0, 2π)`.
//!
//! # Quaternions
//!
//! The corrected quaternion is the Hamilton product `raw ⊗ offset`. Zeroing
//! stores `(-w, x, y, z)` of the current reading as the offset. That is the
//! negated conjugate, i.e. `-q⁻¹` for a unit `q`, so immediately after zeroing
//! the corrected output is `(-1, 0, 0, 0)`: the identity rotation (`q` and
//! `-q` describe the same rotation). The power-on offset is `(-1, 0, 0, 0)` as
//! well, which keeps the sign convention of the output stable across zeroing.

use std::f32::consts::TAU;
use std::ops::Sub;

use nalgebra::Quaternion;

use crate::registers::{EULER_COUNTS_PER_RADIAN, QUATERNION_COUNTS_PER_UNIT};

/// Three-axis Euler angles in radians.
///
/// Axis naming follows the register layout: `x` is heading, `y` is roll,
/// `z` is pitch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EulerAngles {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Create angles from raw register counts (900 LSB per radian)
    pub fn from_raw_counts(counts: [i16; 3]) -> Self {
        Self {
            x: counts[0] as f32 / EULER_COUNTS_PER_RADIAN,
            y: counts[1] as f32 / EULER_COUNTS_PER_RADIAN,
            z: counts[2] as f32 / EULER_COUNTS_PER_RADIAN,
        }
    }

    /// Wrap every axis into `[0, 2π)`
    pub fn normalized(self) -> Self {
        Self {
            x: normalize_angle(self.x),
            y: normalize_angle(self.y),
            z: normalize_angle(self.z),
        }
    }

    /// Convert to degrees
    pub fn to_degrees(&self) -> (f32, f32, f32) {
        (self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees())
    }
}

impl Sub for EulerAngles {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// Create a quaternion from raw register counts in `w, x, y, z` order
/// (16384 LSB per unit).
///
/// The result is not re-normalized; the device already reports a unit
/// quaternion up to quantization.
pub fn quaternion_from_raw_counts(counts: [i16; 4]) -> Quaternion<f32> {
    Quaternion::new(
        counts[0] as f32 / QUATERNION_COUNTS_PER_UNIT,
        counts[1] as f32 / QUATERNION_COUNTS_PER_UNIT,
        counts[2] as f32 / QUATERNION_COUNTS_PER_UNIT,
        counts[3] as f32 / QUATERNION_COUNTS_PER_UNIT,
    )
}

/// Offset that cancels `q` when composed on the right: `(-w, x, y, z)`.
pub fn zeroing_offset(q: &Quaternion<f32>) -> Quaternion<f32> {
    Quaternion::new(-q.w, q.i, q.j, q.k)
}

/// Wrap an angle in radians into `[0, 2π)`.
///
/// The float remainder takes the sign of the dividend, so negative results
/// are shifted up by a full turn. A remainder that rounds up to exactly 2π
/// after the shift is folded back to 0.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut wrapped = angle % TAU;
    if wrapped < 0.0 {
        wrapped += TAU;
    }
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Snapshot of the corrected orientation in both representations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    /// Corrected Euler angles, each in `[0, 2π)`
    pub euler: EulerAngles,
    /// Corrected quaternion `(w, x, y, z)`
    pub quaternion: Quaternion<f32>,
}

/// Raw readings, offsets and corrected outputs for one sensor.
///
/// Raw values are replaced wholesale by [`apply`](Self::apply); offsets change
/// only through the reset methods; corrected values are always recomputed
/// from the other two.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationState {
    euler_raw: EulerAngles,
    euler_offset: EulerAngles,
    euler_corrected: EulerAngles,
    quat_raw: Quaternion<f32>,
    quat_offset: Quaternion<f32>,
    quat_corrected: Quaternion<f32>,
}

impl Default for OrientationState {
    fn default() -> Self {
        let quat_raw = Quaternion::identity();
        // Corrected starts as (-1, 0, 0, 0), the same sign zeroing produces
        let quat_offset = zeroing_offset(&quat_raw);
        Self {
            euler_raw: EulerAngles::ZERO,
            euler_offset: EulerAngles::ZERO,
            euler_corrected: EulerAngles::ZERO,
            quat_raw,
            quat_offset,
            quat_corrected: quat_raw * quat_offset,
        }
    }
}

impl OrientationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new raw reading and recompute the corrected outputs
    pub fn apply(&mut self, euler_raw: EulerAngles, quat_raw: Quaternion<f32>) {
        self.euler_raw = euler_raw;
        self.quat_raw = quat_raw;
        self.recompute();
    }

    /// Decode raw register counts and apply them
    pub fn apply_counts(&mut self, euler_counts: [i16; 3], quat_counts: [i16; 4]) {
        self.apply(
            EulerAngles::from_raw_counts(euler_counts),
            quaternion_from_raw_counts(quat_counts),
        );
    }

    /// Make the last raw Euler reading the new zero.
    ///
    /// Corrected outputs are left alone until the next [`apply`](Self::apply).
    pub fn reset_euler_reference(&mut self) {
        self.euler_offset = self.euler_raw;
    }

    /// Make the last raw quaternion reading the new zero.
    ///
    /// Corrected outputs are left alone until the next [`apply`](Self::apply).
    pub fn reset_quaternion_reference(&mut self) {
        self.quat_offset = zeroing_offset(&self.quat_raw);
    }

    fn recompute(&mut self) {
        self.euler_corrected = (self.euler_raw - self.euler_offset).normalized();
        self.quat_corrected = self.quat_raw * self.quat_offset;
    }

    pub fn euler(&self) -> EulerAngles {
        self.euler_corrected
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        self.quat_corrected
    }

    pub fn raw_euler(&self) -> EulerAngles {
        self.euler_raw
    }

    pub fn raw_quaternion(&self) -> Quaternion<f32> {
        self.quat_raw
    }

    pub fn euler_offset(&self) -> EulerAngles {
        self.euler_offset
    }

    pub fn quaternion_offset(&self) -> Quaternion<f32> {
        self.quat_offset
    }

    /// Corrected orientation in both representations
    pub fn orientation(&self) -> Orientation {
        Orientation {
            euler: self.euler_corrected,
            quaternion: self.quat_corrected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f32::consts::{FRAC_PI_2, PI};

    /// Assert two quaternions describe the same rotation (q and -q are equal)
    fn assert_same_rotation(a: Quaternion<f32>, b: Quaternion<f32>) {
        let dot = a.w * b.w + a.i * b.i + a.j * b.j + a.k * b.k;
        assert_abs_diff_eq!(dot.abs(), 1.0, epsilon = 1e-4);
    }

    fn axis_angle(axis: [f32; 3], angle: f32) -> Quaternion<f32> {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let s = (angle / 2.0).sin() / norm;
        Quaternion::new((angle / 2.0).cos(), axis[0] * s, axis[1] * s, axis[2] * s)
    }

    #[test]
    fn test_normalize_range() {
        let samples = [
            0.0, 1.0, -1.0, TAU, -TAU, 3.0 * TAU + 0.5, -7.25, 1e-7, -1e-7, 1000.0, -1000.0,
        ];
        for a in samples {
            let n = normalize_angle(a);
            assert!((0.0..TAU).contains(&n), "normalize({a}) = {n}");
        }
    }

    #[test]
    fn test_normalize_negative_is_shifted_up() {
        assert_relative_eq!(normalize_angle(-1.0), TAU - 1.0, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(-FRAC_PI_2), 3.0 * FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_is_periodic() {
        for a in [0.3f32, 2.0, 5.9, -0.3, -4.0] {
            assert_abs_diff_eq!(normalize_angle(a + TAU), normalize_angle(a), epsilon = 1e-5);
            assert_abs_diff_eq!(normalize_angle(a - TAU), normalize_angle(a), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_normalize_tiny_negative_stays_below_full_turn() {
        // -1e-9 + 2π rounds to exactly 2π in f32
        let n = normalize_angle(-1e-9);
        assert!(n < TAU);
    }

    #[test]
    fn test_euler_from_counts() {
        let euler = EulerAngles::from_raw_counts([900, 1800, -900]);
        assert_relative_eq!(euler.x, 1.0);
        assert_relative_eq!(euler.y, 2.0);
        assert_relative_eq!(euler.z, -1.0);
    }

    #[test]
    fn test_euler_to_degrees() {
        let (x, y, z) = EulerAngles::new(PI, FRAC_PI_2, 0.0).to_degrees();
        assert_relative_eq!(x, 180.0, epsilon = 1e-4);
        assert_relative_eq!(y, 90.0, epsilon = 1e-4);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_quaternion_from_counts() {
        let q = quaternion_from_raw_counts([16384, -8192, 0, 8192]);
        assert_eq!((q.w, q.i, q.j, q.k), (1.0, -0.5, 0.0, 0.5));
    }

    #[test]
    fn test_product_with_inverse_is_identity() {
        let q = axis_angle([1.0, 2.0, -0.5], 1.1);
        let inv = q.try_inverse().unwrap();
        let p = q * inv;
        assert_abs_diff_eq!(p.w, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.i, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.j, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.k, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zeroing_offset_cancels_reading() {
        let q = axis_angle([0.0, 0.0, 1.0], 0.7);
        let p = q * zeroing_offset(&q);
        assert_same_rotation(p, Quaternion::identity());
        assert_abs_diff_eq!(p.w, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hamilton_product_matches_component_rule() {
        let a = Quaternion::new(0.5f32, 0.5, -0.5, 0.5);
        let b = Quaternion::new(0.1f32, 0.7, 0.2, -0.3);
        let p = a * b;
        assert_abs_diff_eq!(
            p.w, a.w * b.w - a.i * b.i - a.j * b.j - a.k * b.k,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            p.i, a.w * b.i + a.i * b.w + a.j * b.k - a.k * b.j,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            p.j, a.w * b.j - a.i * b.k + a.j * b.w + a.k * b.i,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            p.k, a.w * b.k + a.i * b.j - a.j * b.i + a.k * b.w,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_initial_state_is_consistent() {
        let state = OrientationState::new();
        assert_eq!(state.euler(), EulerAngles::ZERO);
        assert_eq!(state.quaternion(), state.raw_quaternion() * state.quaternion_offset());
        assert_same_rotation(state.quaternion(), Quaternion::identity());
        assert_eq!(state.quaternion(), Quaternion::new(-1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_scenario_zero_offset() {
        let mut state = OrientationState::new();
        state.apply_counts([900, 1800, -900], [16384, 0, 0, 0]);

        let raw = state.raw_euler();
        assert_relative_eq!(raw.z, -1.0);

        let euler = state.euler();
        assert_relative_eq!(euler.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(euler.y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(euler.z, TAU - 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_euler_reset_zeroes_next_update() {
        let mut state = OrientationState::new();
        state.apply_counts([900, 1800, -900], [16384, 0, 0, 0]);
        state.reset_euler_reference();

        // Reset alone does not touch the corrected output
        assert_relative_eq!(state.euler().x, 1.0, epsilon = 1e-6);

        state.apply_counts([900, 1800, -900], [16384, 0, 0, 0]);
        let euler = state.euler();
        assert_abs_diff_eq!(euler.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(euler.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(euler.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_euler_tracks_relative_rotation_after_reset() {
        let mut state = OrientationState::new();
        state.apply_counts([900, 0, 0], [16384, 0, 0, 0]);
        state.reset_euler_reference();

        // Half a radian back from the reference wraps to just under a full turn
        state.apply_counts([450, 0, 0], [16384, 0, 0, 0]);
        assert_relative_eq!(state.euler().x, TAU - 0.5, epsilon = 1e-5);

        state.apply_counts([1350, 0, 0], [16384, 0, 0, 0]);
        assert_relative_eq!(state.euler().x, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_quaternion_reset_yields_identity_rotation() {
        let mut state = OrientationState::new();
        let q = axis_angle([0.3, -1.0, 0.2], 2.0);
        state.apply(EulerAngles::ZERO, q);
        state.reset_quaternion_reference();
        state.apply(EulerAngles::ZERO, q);

        let p = state.quaternion();
        assert_same_rotation(p, Quaternion::identity());
        assert_abs_diff_eq!(p.i, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.j, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.k, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quaternion_tracks_relative_rotation_after_reset() {
        let mut state = OrientationState::new();
        let reference = axis_angle([0.0, 0.0, 1.0], 0.4);
        state.apply(EulerAngles::ZERO, reference);
        state.reset_quaternion_reference();

        let turned = axis_angle([0.0, 0.0, 1.0], 0.4 + FRAC_PI_2);
        state.apply(EulerAngles::ZERO, turned);
        assert_same_rotation(state.quaternion(), axis_angle([0.0, 0.0, 1.0], FRAC_PI_2));
    }

    #[test]
    fn test_corrected_quaternion_stays_unit() {
        let mut state = OrientationState::new();
        state.apply(EulerAngles::ZERO, axis_angle([1.0, 1.0, 0.0], 0.9));
        state.reset_quaternion_reference();
        state.apply(EulerAngles::ZERO, axis_angle([0.0, 1.0, 1.0], -2.3));
        assert_abs_diff_eq!(state.quaternion().norm(), 1.0, epsilon = 1e-5);
    }
}
