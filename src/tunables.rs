//! Process-wide read-only constants consulted at mix time.
//!
//! In the source this spec is distilled from, these are free-standing global
//! `ALfloat`/`#define`s. Here they are fields of a `Copy` struct so a
//! `Device` can be built with an explicit, testable configuration instead of
//! reaching for globals.

/// Number of mantissa bits used for the fixed-point pitch accumulator.
pub const FRACTIONBITS: u32 = 12;
/// `1 << FRACTIONBITS`: one whole sample step in fixed-point pitch units.
pub const FRACTIONONE: u32 = 1 << FRACTIONBITS;
/// Mix-buffer size in samples, per tick.
pub const BUFFERSIZE: usize = 1024;
/// Maximum pitch multiplier a voice may step at.
pub const MAX_PITCH: u32 = 10;
/// Maximum number of auxiliary send slots per voice.
pub const MAX_SENDS: usize = 4;
/// Maximum number of physical output channels a device may have.
pub const MAX_OUTPUT_CHANNELS: usize = 8;
/// Length, in samples, of a head-related impulse response.
pub const HRIR_LENGTH: usize = 32;
/// Below this absolute gain delta a gain ramp snaps instead of stepping.
pub const GAIN_SILENCE_THRESHOLD: f32 = 0.000_01;
/// Per-metre high-frequency attenuation coefficient for air absorption.
pub const AIRABSORBGAINHF: f32 = 0.994_1;
/// Speed of sound, in metres per second, used by Doppler and reverb decay.
pub const SPEEDOFSOUNDMETRESPERSEC: f32 = 343.3;
/// Nanoseconds per second; the unit `Device::clock_base` is expressed in.
pub const DEVICE_CLOCK_RES: u64 = 1_000_000_000;

/// Stepping horizon, in samples, used for gain ramps on every update after
/// a voice's first. At 48 kHz this is about 1.3 ms: short enough that it is
/// inaudible as a ramp, long enough to avoid zipper noise. See
/// `stepping::update_dry_stepping`.
pub const MOVING_STEPPING_HORIZON: usize = 64;

/// Threshold, in seconds, above which an HRTF direction/gain change is
/// considered worth a smooth fade rather than an instant jump.
pub const HRTF_FADE_THRESHOLD_SECS: f32 = 0.000_015;

/// Maximum fade time, in seconds, `calc_fade_time` will ever return.
pub const HRTF_MAX_FADE_SECS: f32 = 0.015;

/// Process-wide read-only tunables consulted at mix time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tunables {
    /// Scales the angle used for cone attenuation. Default 1.
    pub cone_scale: f32,
    /// Scales the Z component of a mono source's direction vector, to
    /// localize it more tightly in the front/back axis. Default 1.
    pub z_scale: f32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            cone_scale: 1.0,
            z_scale: 1.0,
        }
    }
}
