//! HRTF lookup (spec.md §4.3) and the fade-time heuristic (spec.md §4.9).
//!
//! The data-set loader itself is a named external collaborator (spec.md
//! §1): this module only implements the pure interpolation/stepping
//! functions that consume an already-loaded `HrtfSet`.

use crate::math::Vec4;
use crate::tunables::{HRIR_LENGTH, HRTF_FADE_THRESHOLD_SECS, HRTF_MAX_FADE_SECS};

/// Stereo impulse response coefficients for one input channel.
pub type HrirCoeffs = [[f32; 2]; HRIR_LENGTH];

/// One grid point contributing to a bilinear HRTF blend: its coefficients,
/// integer sample delays, and blend weight. Weights across the four points
/// returned by `nearest_four` sum to 1.0; a point with weight 0.0 (e.g. a
/// data set with fewer than four neighbours near the pole) contributes
/// nothing and its coefficients/delays are ignored.
pub type HrtfGridPoint = (HrirCoeffs, [u32; 2], f32);

/// An already-loaded HRTF data set. Only the query this core needs (the
/// four grid points nearest a direction, with elevation/azimuth in
/// radians) is modeled; the on-disk format and the grid itself are
/// external.
pub trait HrtfSet {
    /// Returns the four nearest impulse responses to `(elev, az)` and their
    /// bilinear interpolation weights, already normalized to unit gain.
    fn nearest_four(&self, elev: f32, az: f32) -> [HrtfGridPoint; 4];
    /// Sample rate this data set was captured at.
    fn sample_rate(&self) -> u32;
}

fn scale_coeffs(coeffs: &HrirCoeffs, scale: f32) -> HrirCoeffs {
    let mut out = [[0.0_f32; 2]; HRIR_LENGTH];
    for i in 0..HRIR_LENGTH {
        out[i][0] = coeffs[i][0] * scale;
        out[i][1] = coeffs[i][1] * scale;
    }
    out
}

/// `LerpedHrtfCoeffs`: bilinearly blends the data set's four nearest grid
/// points at the requested direction, scaled by `gain * dir_factor`
/// (`dir_factor` fades out spatialization inside a source's physical
/// radius).
pub fn lerped_hrtf_coeffs(
    set: &dyn HrtfSet,
    elev: f32,
    az: f32,
    dir_factor: f32,
    gain: f32,
) -> (HrirCoeffs, [u32; 2]) {
    let points = set.nearest_four(elev, az);
    let mut coeffs = [[0.0_f32; 2]; HRIR_LENGTH];
    let mut delay_acc = [0.0_f32; 2];
    for (point_coeffs, point_delays, weight) in points.iter() {
        if *weight == 0.0 {
            continue;
        }
        for i in 0..HRIR_LENGTH {
            coeffs[i][0] += point_coeffs[i][0] * weight;
            coeffs[i][1] += point_coeffs[i][1] * weight;
        }
        delay_acc[0] += point_delays[0] as f32 * weight;
        delay_acc[1] += point_delays[1] as f32 * weight;
    }
    let delays = [delay_acc[0].round() as u32, delay_acc[1].round() as u32];
    (scale_coeffs(&coeffs, gain * dir_factor), delays)
}

/// Target coefficients, delays, and the per-sample deltas needed to reach
/// them smoothly over `fade_time` seconds (`MovingHrtfCoeffs`).
pub struct MovingHrtfResult {
    pub coeffs: HrirCoeffs,
    pub delays: [u32; 2],
    pub coeff_step: HrirCoeffs,
    pub delay_step: [f32; 2],
    /// Samples remaining before the target is reached; callers decrement
    /// this each mix step and stop stepping at zero.
    pub counter: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn moving_hrtf_coeffs(
    set: &dyn HrtfSet,
    elev: f32,
    az: f32,
    dir_factor: f32,
    gain: f32,
    fade_time: f32,
    device_freq: u32,
    current_coeffs: &HrirCoeffs,
    current_delays: [u32; 2],
) -> MovingHrtfResult {
    let (target_coeffs, target_delays) = lerped_hrtf_coeffs(set, elev, az, dir_factor, gain);
    let counter = ((fade_time * device_freq as f32).round() as u32).max(1);
    let mut coeff_step = [[0.0_f32; 2]; HRIR_LENGTH];
    for i in 0..HRIR_LENGTH {
        coeff_step[i][0] = (target_coeffs[i][0] - current_coeffs[i][0]) / counter as f32;
        coeff_step[i][1] = (target_coeffs[i][1] - current_coeffs[i][1]) / counter as f32;
    }
    let delay_step = [
        (target_delays[0] as f32 - current_delays[0] as f32) / counter as f32,
        (target_delays[1] as f32 - current_delays[1] as f32) / counter as f32,
    ];
    MovingHrtfResult {
        coeffs: target_coeffs,
        delays: target_delays,
        coeff_step,
        delay_step,
        counter,
    }
}

/// `CalcFadeTime` (spec.md §4.9): guards `old_gain, new_gain >= 1e-4`,
/// computes a log-ratio gain change and, if either gain is audible and the
/// direction changed, an angle change, then biases heavily on the larger of
/// the two (direction weighted 25x), clamped to `HRTF_MAX_FADE_SECS`.
pub fn calc_fade_time(old_gain: f32, new_gain: f32, old_dir: Vec4, new_dir: Vec4) -> f32 {
    let old_gain = old_gain.max(1e-4);
    let new_gain = new_gain.max(1e-4);
    let gain_change = ((new_gain / old_gain).log10() / (1e-4_f32).log10()).abs();

    let angle_change = if gain_change > 1e-4 || new_gain > 1e-4 {
        if old_dir.x != new_dir.x || old_dir.y != new_dir.y || old_dir.z != new_dir.z {
            let cos_angle = old_dir.dot3(new_dir).clamp(-1.0, 1.0);
            cos_angle.acos() / core::f32::consts::PI
        } else {
            0.0
        }
    } else {
        0.0
    };

    (1.0_f32.min(2.0 * (25.0 * angle_change).max(gain_change))) * HRTF_MAX_FADE_SECS
}

/// Returns true once `fade_time` exceeds the threshold worth a smooth fade
/// rather than an instant jump (spec.md §4.6 step 11).
pub fn fade_time_worth_stepping(fade_time: f32) -> bool {
    fade_time > HRTF_FADE_THRESHOLD_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    // P9 — fade-time bounds.
    #[test]
    fn fade_time_is_zero_for_identical_state() {
        let dir = Vec4::direction(0.0, 0.0, -1.0);
        assert_eq!(calc_fade_time(1.0, 1.0, dir, dir), 0.0);
    }

    #[test]
    fn fade_time_never_exceeds_max() {
        let a = Vec4::direction(0.0, 0.0, -1.0);
        let b = Vec4::direction(0.0, 0.0, 1.0);
        let t = calc_fade_time(0.0001, 1.0, a, b);
        assert!(t <= HRTF_MAX_FADE_SECS + 1e-6);
    }

    #[test]
    fn fade_time_reaches_max_on_direction_reversal() {
        let a = Vec4::direction(0.0, 0.0, -1.0);
        let b = Vec4::direction(0.0, 0.0, 1.0);
        let t = calc_fade_time(1.0, 1.0, a, b);
        assert!((t - HRTF_MAX_FADE_SECS).abs() < 1e-6);
    }

    #[test]
    fn fade_time_within_bounds_for_gain_jump() {
        let dir = Vec4::direction(0.0, 0.0, -1.0);
        let t = calc_fade_time(0.0001, 1.0, dir, dir);
        assert!(t >= 0.0 && t <= HRTF_MAX_FADE_SECS + 1e-6);
    }
}
