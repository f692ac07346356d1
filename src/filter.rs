//! Per-voice shelf filter pair used for dry/wet HF and LF gain
//! (spec.md §4.6 step 13), grounded on the teacher's `BiquadCoefs`/`Biquad`
//! (`biquad.rs`) but specialized to a first-order shelf rather than a
//! general biquad.

use crate::math::clamp;

bitflags::bitflags! {
    /// Which shelf stages are actually active for a channel. Mirrors the
    /// source's `ActiveType` bitmask.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ActiveType: u8 {
        const LOW_PASS = 0b01;
        const HIGH_PASS = 0b10;
    }
}

/// One-pole shelf filter coefficients and state, direct form I.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShelfFilter {
    a1: f32,
    b0: f32,
    b1: f32,
    z1: f32,
}

impl ShelfFilter {
    /// Builds a low-pass-as-high-shelf filter: passes DC, shelves gain
    /// above `corner` (a fraction of sample rate) by `gain`.
    pub fn high_shelf(corner: f32, gain: f32) -> Self {
        Self::shelf(corner, gain, true)
    }

    /// Builds a high-pass-as-low-shelf filter: shelves gain below `corner`
    /// by `gain`.
    pub fn low_shelf(corner: f32, gain: f32) -> Self {
        Self::shelf(corner, gain, false)
    }

    fn shelf(corner: f32, gain: f32, is_high_shelf: bool) -> Self {
        let corner = clamp(1e-5, 0.499, corner);
        let w = (core::f32::consts::PI * corner).tan();
        let a0r = 1.0 / (w + 1.0);
        let a1 = (w - 1.0) * a0r;
        let (b0, b1) = if is_high_shelf {
            (w * a0r + (gain - 1.0) * a0r * w, w * a0r - (gain - 1.0) * a0r * w)
        } else {
            (a0r + (gain - 1.0) * a0r, -a1 + (gain - 1.0) * (-a1))
        };
        Self { a1, b0, b1, z1: 0.0 }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
    }
}

/// Per-input-channel shelf filter pair installed by the voice updater.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShelfFilters {
    pub low_pass: ShelfFilter,
    pub high_pass: ShelfFilter,
    pub active: u8,
}

/// Installs the low-shelf/high-shelf pair for one input channel
/// (spec.md §4.6 step 13): corner frequencies are `hf_reference`/
/// `lf_reference` as a fraction of `device_freq`, gains are clamped to a
/// minimum of 0.01 to avoid a degenerate shelf.
pub fn init_shelf_filters(
    hf_reference: f32,
    lf_reference: f32,
    dry_gain_hf: f32,
    dry_gain_lf: f32,
    device_freq: f32,
) -> ShelfFilters {
    let hf_gain = dry_gain_hf.max(0.01);
    let lf_gain = dry_gain_lf.max(0.01);
    let mut active = 0u8;
    if hf_gain != 1.0 {
        active |= ActiveType::LOW_PASS.bits();
    }
    if lf_gain != 1.0 {
        active |= ActiveType::HIGH_PASS.bits();
    }
    ShelfFilters {
        low_pass: ShelfFilter::high_shelf(hf_reference / device_freq, hf_gain),
        high_pass: ShelfFilter::low_shelf(lf_reference / device_freq, lf_gain),
        active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_shelf_passes_dc_unchanged() {
        let mut f = ShelfFilter::high_shelf(0.2, 1.0);
        let mut last = 0.0;
        for _ in 0..200 {
            last = f.process(1.0);
        }
        assert!((last - 1.0).abs() < 1e-3);
    }

    #[test]
    fn active_flags_reflect_non_unity_gain() {
        let filters = init_shelf_filters(8000.0, 200.0, 1.0, 1.0, 48000.0);
        assert_eq!(filters.active, 0);
        let filters = init_shelf_filters(8000.0, 200.0, 0.5, 1.0, 48000.0);
        assert_eq!(filters.active, ActiveType::LOW_PASS.bits());
    }
}
