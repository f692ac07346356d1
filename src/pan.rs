//! Gain panner: pure functions distributing a scalar gain over the output
//! channels of the device's current speaker layout.
//!
//! Grounded on the teacher's equal-power `Panner` in `pan.rs`, generalized
//! from a fixed stereo pair to an arbitrary named output layout.

use crate::math::Vec4;
use crate::tunables::MAX_OUTPUT_CHANNELS;

/// Named output channel slots, matching spec.md §3's `ChannelIndexForName`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    BackCenter,
    SideLeft,
    SideRight,
}

/// The device's current output speaker layout: an ordered list of channels,
/// each carrying the azimuth/elevation it physically sits at (radians, CCW
/// from forward, as used by `pan_by_angle`).
#[derive(Clone, Debug)]
pub struct ChannelLayout {
    pub channels: Vec<(Channel, f32, f32)>,
}

impl ChannelLayout {
    pub fn mono() -> Self {
        Self { channels: vec![(Channel::FrontCenter, 0.0, 0.0)] }
    }

    pub fn stereo() -> Self {
        let a = core::f32::consts::FRAC_PI_2;
        Self {
            channels: vec![
                (Channel::FrontLeft, -a, 0.0),
                (Channel::FrontRight, a, 0.0),
            ],
        }
    }

    /// Wider `+/-90` stereo image used by the non-spatial path for a stereo
    /// device without HRTF (spec.md §4.7).
    pub fn stereo_wide() -> Self {
        Self::stereo()
    }

    pub fn quad() -> Self {
        let fl = -core::f32::consts::FRAC_PI_4;
        let fr = core::f32::consts::FRAC_PI_4;
        let bl = -3.0 * core::f32::consts::FRAC_PI_4;
        let br = 3.0 * core::f32::consts::FRAC_PI_4;
        Self {
            channels: vec![
                (Channel::FrontLeft, fl, 0.0),
                (Channel::FrontRight, fr, 0.0),
                (Channel::BackLeft, bl, 0.0),
                (Channel::BackRight, br, 0.0),
            ],
        }
    }

    pub fn five_point_one() -> Self {
        let fl = -core::f32::consts::FRAC_PI_4;
        let fr = core::f32::consts::FRAC_PI_4;
        let bl = -5.0 * core::f32::consts::FRAC_PI_6;
        let br = 5.0 * core::f32::consts::FRAC_PI_6;
        Self {
            channels: vec![
                (Channel::FrontLeft, fl, 0.0),
                (Channel::FrontRight, fr, 0.0),
                (Channel::FrontCenter, 0.0, 0.0),
                (Channel::Lfe, 0.0, 0.0),
                (Channel::BackLeft, bl, 0.0),
                (Channel::BackRight, br, 0.0),
            ],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn index_for_name(&self, channel: Channel) -> Option<usize> {
        self.channels.iter().position(|(c, _, _)| *c == channel)
    }
}

/// `ChannelIndexForName(device, channel) -> -1` semantics, as a signed index
/// for direct parity with the source this spec was distilled from.
#[inline]
pub fn channel_index_for_name(layout: &ChannelLayout, channel: Channel) -> i32 {
    match layout.index_for_name(channel) {
        Some(i) => i as i32,
        None => -1,
    }
}

/// Fixed-size per-output-channel gain vector, sized to the device's maximum
/// channel count. Unused tail entries are zero.
pub type Gains = [f32; MAX_OUTPUT_CHANNELS];

fn zero_gains() -> Gains {
    [0.0; MAX_OUTPUT_CHANNELS]
}

/// Distributes `gain` over `layout`'s output channels based on azimuth `az`
/// (radians, CCW from forward) and elevation `el`, using a simple equal
/// power law over angular distance from each speaker.
pub fn pan_by_angle(layout: &ChannelLayout, az: f32, el: f32, gain: f32) -> Gains {
    let dir = Vec4::direction(az.sin() * el.cos(), el.sin(), -az.cos() * el.cos());
    pan_by_direction(layout, dir, gain)
}

/// Equivalent to `pan_by_angle`, taking a unit direction vector directly
/// (head space: +X right, +Y up, -Z forward).
pub fn pan_by_direction(layout: &ChannelLayout, dir: Vec4, gain: f32) -> Gains {
    let mut out = zero_gains();
    if layout.channels.is_empty() {
        return out;
    }
    // Weight each speaker by a raised-cosine lobe of the angle between the
    // source direction and the speaker direction, then renormalize so total
    // power (sum of squared weights) equals `gain^2`.
    let mut weights = [0.0_f32; MAX_OUTPUT_CHANNELS];
    let mut total_sq = 0.0_f32;
    for (i, (ch, az, el)) in layout.channels.iter().enumerate() {
        if *ch == Channel::Lfe {
            continue;
        }
        let speaker_dir =
            Vec4::direction(az.sin() * el.cos(), el.sin(), -az.cos() * el.cos());
        let cos_angle = dir.dot3(speaker_dir).max(0.0);
        let w = cos_angle * cos_angle;
        weights[i] = w;
        total_sq += w;
    }
    if total_sq <= 0.0 {
        // No speaker is within 90 degrees; fall back to nearest by raw dot.
        let mut best = 0usize;
        let mut best_dot = f32::NEG_INFINITY;
        for (i, (ch, az, el)) in layout.channels.iter().enumerate() {
            if *ch == Channel::Lfe {
                continue;
            }
            let speaker_dir =
                Vec4::direction(az.sin() * el.cos(), el.sin(), -az.cos() * el.cos());
            let d = dir.dot3(speaker_dir);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        out[best] = gain;
        return out;
    }
    let norm = gain / total_sq.sqrt();
    for (i, w) in weights.iter().enumerate() {
        if *w > 0.0 {
            out[i] = w.sqrt() * norm;
        }
    }
    out
}

/// Pans one ambisonic input channel, whose row is its B-Format coefficient
/// `(w, x, y, z)`, over the layout.
pub fn pan_b_format(layout: &ChannelLayout, row: [f32; 4], gain: f32) -> Gains {
    let mut out = zero_gains();
    let (w, x, y, z) = (row[0], row[1], row[2], row[3]);
    for (i, (ch, az, el)) in layout.channels.iter().enumerate() {
        if *ch == Channel::Lfe {
            continue;
        }
        let speaker_dir =
            Vec4::direction(az.sin() * el.cos(), el.sin(), -az.cos() * el.cos());
        // First-order ambisonic decode: W plus directional dot with (X, Y, Z).
        let decoded = w + x * speaker_dir.x + y * speaker_dir.y + z * speaker_dir.z;
        out[i] = decoded.max(0.0) * gain;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_center_pans_equally() {
        let layout = ChannelLayout::stereo();
        let forward = Vec4::direction(0.0, 0.0, -1.0);
        let gains = pan_by_direction(&layout, forward, 1.0);
        assert!((gains[0] - gains[1]).abs() < 1e-5);
    }

    #[test]
    fn stereo_left_favors_left_channel() {
        let layout = ChannelLayout::stereo();
        let left = Vec4::direction(-1.0, 0.0, 0.0);
        let gains = pan_by_direction(&layout, left, 1.0);
        assert!(gains[0] > gains[1]);
    }

    #[test]
    fn channel_index_for_name_missing_is_negative_one() {
        let layout = ChannelLayout::stereo();
        assert_eq!(channel_index_for_name(&layout, Channel::Lfe), -1);
        assert_eq!(channel_index_for_name(&layout, Channel::FrontLeft), 0);
    }
}
