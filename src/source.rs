//! Source data model (spec.md §3), distance model evaluation and cone
//! attenuation (spec.md §4.6 steps 4 and 7).

use crate::math::{clamp, lerp, Vec4};
use crate::tunables::MAX_SENDS;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DistanceModel {
    None,
    Inverse,
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

/// One auxiliary send slot's configuration, owned by the source.
#[derive(Copy, Clone, Debug, Default)]
pub struct SendConfig {
    pub gain: f32,
    pub gain_hf: f32,
    pub gain_lf: f32,
    pub hf_reference: f32,
    pub lf_reference: f32,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Cone {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
    pub outer_gain_hf: f32,
}

/// Direct-path gain/HF/LF/reference triple, and per-send auto flags.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectPath {
    pub gain: f32,
    pub gain_hf: f32,
    pub gain_lf: f32,
    pub hf_reference: f32,
    pub lf_reference: f32,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SendAutoFlags {
    pub wet_gain_auto: bool,
    pub wet_gain_hf_auto: bool,
}

/// External source state, read by the core each tick it is dirty.
#[derive(Clone, Debug)]
pub struct Source {
    pub position: Vec4,
    pub velocity: Vec4,
    pub direction: Vec4,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub pitch: f32,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    pub room_rolloff_factor: f32,
    pub cone: Cone,
    pub air_absorption_factor: f32,
    pub doppler_factor: f32,
    pub distance_model: Option<DistanceModel>,
    pub head_relative: bool,
    pub direct_channels: bool,
    pub dry_gain_hf_auto: bool,
    pub source_radius: f32,
    pub direct: DirectPath,
    pub sends: [SendConfig; MAX_SENDS],
    pub send_auto: [SendAutoFlags; MAX_SENDS],
    pub num_sends: usize,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            position: Vec4::point(0.0, 0.0, 0.0),
            velocity: Vec4::direction(0.0, 0.0, 0.0),
            direction: Vec4::direction(0.0, 0.0, -1.0),
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            pitch: 1.0,
            reference_distance: 1.0,
            max_distance: f32::MAX,
            rolloff_factor: 1.0,
            room_rolloff_factor: 0.0,
            cone: Cone { inner_angle: 360.0, outer_angle: 360.0, outer_gain: 0.0, outer_gain_hf: 1.0 },
            air_absorption_factor: 0.0,
            doppler_factor: 1.0,
            distance_model: None,
            head_relative: false,
            direct_channels: false,
            dry_gain_hf_auto: true,
            source_radius: 0.0,
            direct: DirectPath { gain: 1.0, gain_hf: 1.0, gain_lf: 1.0, hf_reference: 5000.0, lf_reference: 250.0 },
            sends: [SendConfig::default(); MAX_SENDS],
            send_auto: [SendAutoFlags::default(); MAX_SENDS],
            num_sends: 0,
        }
    }
}

/// `ClampedDist` per spec.md §4.6 step 4: clamps distance into
/// `[min_dist, max_dist]`, except `None` always uses `min_dist`.
pub(crate) fn clamped_distance(model: DistanceModel, distance: f32, min_dist: f32, max_dist: f32) -> f32 {
    match model {
        DistanceModel::None => min_dist,
        DistanceModel::InverseClamped | DistanceModel::LinearClamped | DistanceModel::ExponentClamped => {
            if max_dist < min_dist {
                distance
            } else {
                clamp(min_dist, max_dist, distance)
            }
        }
        _ => distance,
    }
}

/// Computes dry or send attenuation for the active distance model
/// (spec.md §4.6 step 4). `distance` is the raw (unclamped) distance to the
/// listener.
pub fn distance_attenuation(
    model: DistanceModel,
    distance: f32,
    min_dist: f32,
    max_dist: f32,
    rolloff: f32,
) -> f32 {
    if matches!(
        model,
        DistanceModel::InverseClamped | DistanceModel::LinearClamped | DistanceModel::ExponentClamped
    ) && max_dist < min_dist
    {
        return 1.0;
    }

    let clamped = clamped_distance(model, distance, min_dist, max_dist);

    match model {
        DistanceModel::None => 1.0,
        DistanceModel::Inverse | DistanceModel::InverseClamped => {
            let denom = lerp(min_dist, clamped, rolloff);
            if denom <= 0.0 {
                1.0
            } else {
                min_dist / denom
            }
        }
        DistanceModel::Linear | DistanceModel::LinearClamped => {
            let span = max_dist - min_dist;
            if span <= 0.0 {
                1.0
            } else {
                (1.0 - rolloff * (clamped - min_dist) / span).max(0.0)
            }
        }
        DistanceModel::Exponent | DistanceModel::ExponentClamped => {
            if min_dist <= 0.0 {
                1.0
            } else {
                (clamped / min_dist).powf(-rolloff)
            }
        }
    }
}

/// Cone attenuation gains `(cone_gain, cone_gain_hf)` from the angle between
/// the source's facing direction and the vector toward the listener
/// (spec.md §4.6 step 7). `theta_deg` is already `2 * acos(...) * cone_scale`
/// in degrees.
pub fn cone_attenuation(cone: &Cone, theta_deg: f32) -> (f32, f32) {
    if theta_deg <= cone.inner_angle {
        (1.0, 1.0)
    } else if theta_deg >= cone.outer_angle {
        (cone.outer_gain, cone.outer_gain_hf)
    } else {
        let span = cone.outer_angle - cone.inner_angle;
        let t = if span <= 0.0 { 1.0 } else { (theta_deg - cone.inner_angle) / span };
        (lerp(1.0, cone.outer_gain, t), lerp(1.0, cone.outer_gain_hf, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // P3 — distance model boundary.
    #[test]
    fn inverse_clamped_boundary() {
        let m = DistanceModel::InverseClamped;
        assert_eq!(distance_attenuation(m, 0.5, 1.0, 10.0, 1.0), 1.0);
        assert_eq!(distance_attenuation(m, 1.0, 1.0, 10.0, 1.0), 1.0);
        assert_eq!(distance_attenuation(m, 2.0, 1.0, 10.0, 1.0), 0.5);
        assert!((distance_attenuation(m, 20.0, 1.0, 10.0, 1.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn inverse_clamped_defaults_to_one_when_max_below_min() {
        let m = DistanceModel::InverseClamped;
        assert_eq!(distance_attenuation(m, 5.0, 10.0, 1.0, 1.0), 1.0);
    }

    // P4 — linear model midpoint.
    #[test]
    fn linear_clamped_midpoint() {
        let m = DistanceModel::LinearClamped;
        assert_eq!(distance_attenuation(m, 2.0, 1.0, 3.0, 1.0), 0.5);
        assert_eq!(distance_attenuation(m, 0.5, 1.0, 3.0, 1.0), 1.0);
        assert_eq!(distance_attenuation(m, 4.0, 1.0, 3.0, 1.0), 0.0);
    }

    // P5 — exponent model.
    #[test]
    fn exponent_model() {
        let m = DistanceModel::Exponent;
        assert!((distance_attenuation(m, 2.0, 1.0, f32::MAX, 2.0) - 0.25).abs() < 1e-6);
    }

    // P8 — cone attenuation continuity.
    #[test]
    fn cone_attenuation_continuity() {
        let cone = Cone { inner_angle: 30.0, outer_angle: 90.0, outer_gain: 0.2, outer_gain_hf: 1.0 };
        let (g, _) = cone_attenuation(&cone, 30.0);
        assert_eq!(g, 1.0);
        let (g, _) = cone_attenuation(&cone, 90.0);
        assert_eq!(g, 0.2);
        let (g, _) = cone_attenuation(&cone, 60.0);
        assert!((g - 0.6).abs() < 1e-6);
    }
}
