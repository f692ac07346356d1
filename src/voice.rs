//! The voice updater (spec.md §4.6, §4.7) and `mix_source` (spec.md §4.8
//! step e). This is the heart of the mix core.

use crate::buffer::{BufferFormat, OutBusHandle, PlanarBuffer, SourceBuffer};
use crate::effect::EffectSlot;
use crate::filter::{init_shelf_filters, ShelfFilters};
use crate::hrtf::{calc_fade_time, fade_time_worth_stepping, lerped_hrtf_coeffs, moving_hrtf_coeffs, HrirCoeffs, HrtfSet};
use crate::listener::ListenerParams;
use crate::math::{clamp, Vec4};
use crate::pan::{channel_index_for_name, pan_b_format, pan_by_angle, pan_by_direction, Channel, ChannelLayout, Gains};
use crate::source::{clamped_distance, cone_attenuation, distance_attenuation, DistanceModel, Source};
use crate::stepping::{update_dry_stepping, update_wet_stepping, GainStep};
use crate::tunables::{MAX_OUTPUT_CHANNELS, MAX_SENDS, MOVING_STEPPING_HORIZON, SPEEDOFSOUNDMETRESPERSEC};
use crate::tunables::{AIRABSORBGAINHF, FRACTIONONE, MAX_PITCH};
use crate::tunables::Tunables;

/// Per-input-channel gain ramp set for the direct path. `MAX_INPUT_CHANS`
/// covers the widest non-spatial layout (7.1) this core supports.
pub const MAX_INPUT_CHANS: usize = 8;

#[derive(Copy, Clone, Debug, Default)]
pub struct HrtfChannelState {
    pub coeffs: [[f32; 2]; crate::tunables::HRIR_LENGTH],
    pub delays: [u32; 2],
    pub coeff_step: [[f32; 2]; crate::tunables::HRIR_LENGTH],
    pub delay_step: [f32; 2],
}

/// The direct (dry) path's mixing state, owned by the voice.
pub struct Direct {
    pub out_bus: OutBusHandle,
    pub out_channels: usize,
    pub gains: [[GainStep; MAX_OUTPUT_CHANNELS]; MAX_INPUT_CHANS],
    pub filters: [ShelfFilters; MAX_INPUT_CHANS],
    pub hrtf: [HrtfChannelState; MAX_INPUT_CHANS],
    pub counter: u32,
    pub moving: bool,
    pub last_gain: f32,
    pub last_dir: Vec4,
}

impl Default for Direct {
    fn default() -> Self {
        Self {
            out_bus: OutBusHandle::Real { first_channel: 0, num_channels: 0 },
            out_channels: 0,
            gains: [[GainStep::default(); MAX_OUTPUT_CHANNELS]; MAX_INPUT_CHANS],
            filters: [ShelfFilters::default(); MAX_INPUT_CHANS],
            hrtf: [HrtfChannelState::default(); MAX_INPUT_CHANS],
            counter: 0,
            moving: false,
            last_gain: 0.0,
            last_dir: Vec4::direction(0.0, 0.0, -1.0),
        }
    }
}

/// One auxiliary send's mixing state.
#[derive(Clone)]
pub struct SendState {
    pub out_bus: Option<usize>,
    pub gain: GainStep,
    pub filters: ShelfFilters,
    pub counter: u32,
    pub moving: bool,
}

impl Default for SendState {
    fn default() -> Self {
        Self { out_bus: None, gain: GainStep::default(), filters: ShelfFilters::default(), counter: 0, moving: false }
    }
}

/// Fixed-point pitch accumulator state.
#[derive(Copy, Clone, Debug, Default)]
pub struct PitchAccumulator {
    pub position: u64,
    pub position_frac: u32,
}

/// The per-tick mixing state for one active source (spec.md §3).
pub struct Voice {
    pub has_source: bool,
    pub step: u32,
    pub is_hrtf: bool,
    pub direct: Direct,
    pub sends: [SendState; MAX_SENDS],
    pub num_sends: usize,
    pub accumulator: PitchAccumulator,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            has_source: false,
            step: FRACTIONONE,
            is_hrtf: false,
            direct: Direct::default(),
            sends: Default::default(),
            num_sends: 0,
            accumulator: PitchAccumulator::default(),
        }
    }
}

impl Voice {
    /// Clears `Source` back-reference; the voice is now reusable. Called on
    /// disconnect (spec.md §5) or when a source stops playing.
    pub fn detach(&mut self) {
        self.has_source = false;
        self.accumulator = PitchAccumulator::default();
    }
}

/// Derived per-send room parameters (spec.md §4.6 step 2).
#[derive(Copy, Clone, Debug)]
struct RoomParams {
    room_rolloff: f32,
    decay_distance: f32,
    room_air_absorption: f32,
}

fn room_params_for_send(source: &Source, send_index: usize, slot: Option<&EffectSlot>) -> RoomParams {
    let send = &source.sends[send_index];
    let _ = send;
    match slot.filter(|s| s.aux_send_auto).and_then(|s| s.state.reverb_properties()) {
        Some(props) => RoomParams {
            room_rolloff: source.room_rolloff_factor + props.room_rolloff_factor,
            decay_distance: props.decay_time * SPEEDOFSOUNDMETRESPERSEC,
            room_air_absorption: props.air_absorption_gain_hf,
        },
        None => RoomParams {
            room_rolloff: source.rolloff_factor,
            decay_distance: 0.0,
            room_air_absorption: AIRABSORBGAINHF,
        },
    }
}

/// Computes the fixed-point pitch step for a buffer whose native rate is
/// `buffer_freq`, resampled to `device_freq`, at logical `pitch`
/// (spec.md §4.6 step 10 / §4.7). Mirrors the source's direct comparison
/// against `MAX_PITCH` before the shift, rather than a generic clamp, so the
/// boundary matches bit-for-bit.
pub fn pitch_to_step(pitch: f32, buffer_freq: u32, device_freq: u32) -> u32 {
    let scaled_pitch = pitch * buffer_freq as f32 / device_freq as f32;
    if scaled_pitch > MAX_PITCH as f32 {
        return MAX_PITCH << crate::tunables::FRACTIONBITS;
    }
    let step = (scaled_pitch * FRACTIONONE as f32).round() as i64;
    step.clamp(1, (MAX_PITCH << crate::tunables::FRACTIONBITS) as i64) as u32
}

/// Doppler-scaled pitch (spec.md §4.6 step 9). `c` is the speed of sound;
/// if `c < 1` both `doppler_factor` and `c` are clamped to avoid a
/// degenerate divisor.
fn doppler_pitch(
    pitch: f32,
    source_vel: Vec4,
    listener_vel: Vec4,
    source_to_listener: Vec4,
    doppler_factor: f32,
) -> f32 {
    if doppler_factor <= 0.0 {
        return pitch;
    }
    let mut c = SPEEDOFSOUNDMETRESPERSEC;
    let mut factor = doppler_factor;
    if c < 1.0 {
        factor *= c;
        c = 1.0;
    }
    let vss = source_vel.dot3(source_to_listener) * factor;
    let vls = listener_vel.dot3(source_to_listener) * factor;
    let denom_vss = clamp(1.0, 2.0 * c - 1.0, c - vss);
    let denom_vls = clamp(1.0, 2.0 * c - 1.0, c - vls);
    pitch * denom_vls / denom_vss
}

/// Inputs to `update_voice_spatial` not already owned by `Voice`/`Source`.
pub struct SpatialUpdateCtx<'a> {
    pub source: &'a Source,
    pub listener: &'a ListenerParams,
    pub head_buffer: &'a SourceBuffer,
    pub device_freq: u32,
    pub device_layout: &'a ChannelLayout,
    pub hrtf: Option<&'a dyn HrtfSet>,
    pub effect_slots: [Option<&'a EffectSlot>; MAX_SENDS],
    pub num_sends: usize,
    pub tunables: &'a Tunables,
    /// The context's own distance model, used whenever `source_distance_model`
    /// is false or the source has no override (spec.md §4.6 step 4).
    pub context_distance_model: DistanceModel,
    /// Mirrors `AL_SOURCE_DISTANCE_MODEL`: when true, a source's own
    /// `distance_model` (if set) wins over `context_distance_model`.
    pub source_distance_model: bool,
}

/// `UpdateVoiceSpatial` (spec.md §4.6): parameter update for a point-source
/// (mono) voice.
pub fn update_voice_spatial(voice: &mut Voice, ctx: &SpatialUpdateCtx) {
    voice.num_sends = ctx.num_sends;
    voice.is_hrtf = ctx.hrtf.is_some();

    let source = ctx.source;

    // Step 2: per-send room parameters.
    let mut room = [RoomParams { room_rolloff: source.rolloff_factor, decay_distance: 0.0, room_air_absorption: AIRABSORBGAINHF }; MAX_SENDS];
    for i in 0..ctx.num_sends {
        room[i] = room_params_for_send(source, i, ctx.effect_slots[i]);
    }

    // Step 3: transform into head space.
    let (position, velocity, direction, listener_vel) = if source.head_relative {
        (source.position, source.velocity, source.direction, ctx.listener.velocity)
    } else {
        (
            ctx.listener.matrix.transform(source.position),
            ctx.listener.matrix.transform(source.velocity),
            ctx.listener.matrix.transform(source.direction),
            Vec4::direction(0.0, 0.0, 0.0),
        )
    };
    let velocity = if source.head_relative { velocity.add3(ctx.listener.velocity) } else { velocity };
    let source_to_listener = position.neg3().normalize();
    let distance = position.length3();

    // Step 4: distance attenuation.
    let model = if ctx.source_distance_model {
        source.distance_model.unwrap_or(ctx.context_distance_model)
    } else {
        ctx.context_distance_model
    };
    let mut dry_gain = distance_attenuation(model, distance, source.reference_distance, source.max_distance, source.rolloff_factor);
    let mut wet_gain = [0.0_f32; MAX_SENDS];
    for i in 0..ctx.num_sends {
        wet_gain[i] = distance_attenuation(model, distance, source.reference_distance, source.max_distance, room[i].room_rolloff);
    }

    // Step 5: air absorption.
    let clamped_dist = clamped_distance(model, distance, source.reference_distance, source.max_distance);
    let mut dry_gain_hf = source.direct.gain_hf;
    let mut wet_gain_hf = [1.0_f32; MAX_SENDS];
    if source.air_absorption_factor > 0.0 && clamped_dist > source.reference_distance {
        let delta = clamped_dist - source.reference_distance;
        dry_gain_hf *= AIRABSORBGAINHF.powf(source.air_absorption_factor * delta * ctx.listener.meters_per_unit);
        for i in 0..ctx.num_sends {
            wet_gain_hf[i] = source.sends[i].gain_hf
                * room[i].room_air_absorption.powf(source.air_absorption_factor * delta * ctx.listener.meters_per_unit);
        }
    } else {
        for i in 0..ctx.num_sends {
            wet_gain_hf[i] = source.sends[i].gain_hf;
        }
    }

    // Step 6: reverb apparent-distance modifier.
    for i in 0..ctx.num_sends {
        if source.send_auto[i].wet_gain_auto && room[i].decay_distance > 0.0 {
            let apparent_dist = 1.0 / dry_gain.max(1e-5) - 1.0;
            wet_gain[i] *= 0.001_f32.powf(apparent_dist / room[i].decay_distance);
        }
    }

    // Step 7: cone attenuation.
    let cos_angle = clamp(-1.0, 1.0, direction.dot3(source_to_listener));
    let theta = 2.0 * cos_angle.acos().to_degrees() * ctx.tunables.cone_scale;
    let (cone_gain, cone_gain_hf) = cone_attenuation(&source.cone, theta);
    dry_gain *= cone_gain;
    if source.dry_gain_hf_auto {
        dry_gain_hf *= cone_gain_hf;
    }
    for i in 0..ctx.num_sends {
        if source.send_auto[i].wet_gain_auto {
            wet_gain[i] *= cone_gain;
        }
        if source.send_auto[i].wet_gain_hf_auto {
            wet_gain_hf[i] *= cone_gain_hf;
        }
    }

    // Step 8: clamp and apply listener/user/send gain.
    dry_gain = clamp(source.min_gain, source.max_gain, dry_gain) * ctx.listener.gain * source.direct.gain * source.gain;
    for i in 0..ctx.num_sends {
        wet_gain[i] = clamp(source.min_gain, source.max_gain, wet_gain[i]) * ctx.listener.gain * source.gain * source.sends[i].gain;
    }

    // Step 9: Doppler.
    let pitch = doppler_pitch(source.pitch, velocity, listener_vel, source_to_listener, source.doppler_factor);

    // Step 10: pitch stepping.
    voice.step = pitch_to_step(pitch, ctx.head_buffer.sample_rate, ctx.device_freq);

    // Step 11: direction, HRTF or panning.
    let eps = 1e-6;
    let (dir, az, el) = if distance < eps {
        (Vec4::direction(0.0, 0.0, -1.0), 0.0, 0.0)
    } else {
        // Direction from listener to source, in head space: the source is
        // already positioned relative to the listener by step 3 above.
        let mut d = position.normalize();
        d.z *= ctx.tunables.z_scale;
        let el = clamp(-1.0, 1.0, d.y).asin();
        let az = d.x.atan2(-d.z);
        (d, az, el)
    };
    let dir_factor = if source.source_radius > distance && distance > 0.0 {
        distance / source.source_radius
    } else {
        1.0
    };

    let horizon = if voice.direct.moving { MOVING_STEPPING_HORIZON } else { 0 };
    if let Some(hrtf_set) = ctx.hrtf {
        voice.direct.out_bus = crate::buffer::OutBusHandle::VirtualBinaural;
        voice.direct.out_channels = 2;
        let moving = voice.direct.moving;
        let last_gain = voice.direct.last_gain;
        let last_dir = voice.direct.last_dir;
        let state = &mut voice.direct.hrtf[0];
        if moving {
            let fade_time = calc_fade_time(last_gain, dry_gain, last_dir, dir);
            if fade_time_worth_stepping(fade_time) {
                let result = moving_hrtf_coeffs(hrtf_set, el, az, dir_factor, dry_gain, fade_time, ctx.device_freq, &state.coeffs, state.delays);
                state.coeff_step = result.coeff_step;
                state.delay_step = result.delay_step;
                voice.direct.counter = result.counter;
            } else {
                let (coeffs, delays) = lerped_hrtf_coeffs(hrtf_set, el, az, dir_factor, dry_gain);
                state.coeffs = coeffs;
                state.delays = delays;
                state.coeff_step = [[0.0; 2]; crate::tunables::HRIR_LENGTH];
                state.delay_step = [0.0; 2];
                voice.direct.counter = 0;
            }
        } else {
            let (coeffs, delays) = lerped_hrtf_coeffs(hrtf_set, el, az, dir_factor, dry_gain);
            state.coeffs = coeffs;
            state.delays = delays;
            voice.direct.counter = 0;
        }
        voice.direct.last_gain = dry_gain;
        voice.direct.last_dir = dir;
        voice.direct.moving = true;
    } else {
        voice.direct.out_bus = crate::buffer::OutBusHandle::Real { first_channel: 0, num_channels: ctx.device_layout.num_channels() };
        voice.direct.out_channels = ctx.device_layout.num_channels();
        let gains = pan_by_direction(ctx.device_layout, dir, dry_gain);
        let mut targets = [[0.0_f32; MAX_OUTPUT_CHANNELS]; MAX_INPUT_CHANS];
        targets[0] = gains;
        update_dry_stepping(&mut voice.direct.gains, &targets, 1, horizon);
        voice.direct.moving = true;
    }

    // Step 12: per-send wet stepping.
    for i in 0..ctx.num_sends {
        update_wet_stepping(&mut voice.sends[i].gain, wet_gain[i], horizon);
        voice.sends[i].moving = true;
    }

    // Step 13: shelf filters.
    voice.direct.filters[0] = init_shelf_filters(source.direct.hf_reference, source.direct.lf_reference, dry_gain_hf, source.direct.gain_lf, ctx.device_freq as f32);
    for i in 0..ctx.num_sends {
        voice.sends[i].filters = init_shelf_filters(source.sends[i].hf_reference, source.sends[i].lf_reference, wet_gain_hf[i], source.sends[i].gain_lf, ctx.device_freq as f32);
    }
}

/// An `(azimuth, elevation, channel)` map entry for one input channel of a
/// pre-panned layout (spec.md §4.7).
#[derive(Copy, Clone)]
pub struct NonSpatialChannelMap {
    pub azimuth: f32,
    pub elevation: f32,
    pub channel: Channel,
}

fn nonspatial_map(format: BufferFormat, device_stereo_no_hrtf: bool) -> Vec<NonSpatialChannelMap> {
    use core::f32::consts::FRAC_PI_2;
    let m = |az: f32, el: f32, ch: Channel| NonSpatialChannelMap { azimuth: az, elevation: el, channel: ch };
    match format {
        BufferFormat::Mono => vec![m(0.0, 0.0, Channel::FrontCenter)],
        BufferFormat::Stereo if device_stereo_no_hrtf => {
            vec![m(-FRAC_PI_2, 0.0, Channel::FrontLeft), m(FRAC_PI_2, 0.0, Channel::FrontRight)]
        }
        BufferFormat::Stereo => {
            vec![m(-FRAC_PI_2 / 3.0, 0.0, Channel::FrontLeft), m(FRAC_PI_2 / 3.0, 0.0, Channel::FrontRight)]
        }
        BufferFormat::Rear => vec![m(core::f32::consts::PI - 0.6, 0.0, Channel::BackLeft), m(-(core::f32::consts::PI - 0.6), 0.0, Channel::BackRight)],
        BufferFormat::Quad => vec![
            m(-FRAC_PI_2 / 3.0, 0.0, Channel::FrontLeft),
            m(FRAC_PI_2 / 3.0, 0.0, Channel::FrontRight),
            m(-3.0 * FRAC_PI_2 / 2.0 / 2.0, 0.0, Channel::BackLeft),
            m(3.0 * FRAC_PI_2 / 2.0 / 2.0, 0.0, Channel::BackRight),
        ],
        _ => vec![m(0.0, 0.0, Channel::FrontCenter)],
    }
}

/// Inputs to `update_voice_nonspatial` not already owned by `Voice`/`Source`.
pub struct NonSpatialUpdateCtx<'a> {
    pub source: &'a Source,
    pub listener: &'a ListenerParams,
    pub head_buffer: &'a SourceBuffer,
    pub device_freq: u32,
    pub device_layout: &'a ChannelLayout,
    pub device_is_stereo_no_hrtf: bool,
    pub hrtf: Option<&'a dyn HrtfSet>,
}

/// `UpdateVoiceNonSpatial` (spec.md §4.7): parameter update for voices whose
/// channel layout is pre-panned (multi-channel/B-Format) or bypasses
/// panning (direct-channel mode). No Doppler: multichannel buffers do not
/// Doppler (spec.md §9 Open Questions).
pub fn update_voice_nonspatial(voice: &mut Voice, ctx: &NonSpatialUpdateCtx) {
    let source = ctx.source;
    voice.is_hrtf = ctx.hrtf.is_some();
    voice.direct.out_bus = crate::buffer::OutBusHandle::Real { first_channel: 0, num_channels: ctx.device_layout.num_channels() };
    voice.direct.out_channels = ctx.device_layout.num_channels();

    voice.step = pitch_to_step(source.pitch, ctx.head_buffer.sample_rate, ctx.device_freq);
    let horizon = if voice.direct.moving { MOVING_STEPPING_HORIZON } else { 0 };

    let mut targets = [[0.0_f32; MAX_OUTPUT_CHANNELS]; MAX_INPUT_CHANS];
    let num_chans;

    if ctx.head_buffer.format.is_b_format() {
        // B-Format: re-rotate AT/UP by the listener transform unless head-relative.
        let at = if source.head_relative { Vec4::direction(0.0, 0.0, -1.0) } else { ctx.listener.matrix.transform(Vec4::direction(0.0, 0.0, -1.0)) };
        let up = if source.head_relative { Vec4::direction(0.0, 1.0, 0.0) } else { ctx.listener.matrix.transform(Vec4::direction(0.0, 1.0, 0.0)) };
        let _ = (at, up); // orientation re-rotation is a data-set detail external to this core.
        num_chans = ctx.head_buffer.format.num_channels().min(4);
        for c in 0..num_chans {
            let row = match c {
                0 => [1.0, 0.0, 0.0, 0.0],
                1 => [0.0, 1.0, 0.0, 0.0],
                2 => [0.0, 0.0, 1.0, 0.0],
                _ => [0.0, 0.0, 0.0, 1.0],
            };
            targets[c] = pan_b_format(ctx.device_layout, row, source.direct.gain);
        }
        update_dry_stepping(&mut voice.direct.gains, &targets, num_chans, horizon);
        // Wet gains boosted by sqrt(2) under B-Format, preserved verbatim
        // though unjustified in the original (spec.md §9 Open Questions).
        for send in voice.sends.iter_mut().take(voice.num_sends) {
            update_wet_stepping(&mut send.gain, source.direct.gain * core::f32::consts::SQRT_2, horizon);
        }
    } else if source.direct_channels {
        let chans = nonspatial_map(ctx.head_buffer.format, ctx.device_is_stereo_no_hrtf);
        num_chans = chans.len();
        if ctx.hrtf.is_some() {
            for (c, entry) in chans.iter().enumerate() {
                if entry.channel == Channel::FrontLeft {
                    targets[c][0] = source.direct.gain;
                } else if entry.channel == Channel::FrontRight {
                    targets[c][1] = source.direct.gain;
                }
            }
            voice.direct.out_bus = crate::buffer::OutBusHandle::VirtualBinaural;
            voice.direct.out_channels = 2;
        } else {
            for (c, entry) in chans.iter().enumerate() {
                if let Some(idx) = ctx.device_layout.index_for_name(entry.channel) {
                    targets[c][idx] = source.direct.gain;
                }
            }
        }
        update_dry_stepping(&mut voice.direct.gains, &targets, num_chans, horizon);
    } else {
        let chans = nonspatial_map(ctx.head_buffer.format, ctx.device_is_stereo_no_hrtf);
        num_chans = chans.len();
        for (c, entry) in chans.iter().enumerate() {
            if entry.channel == Channel::Lfe {
                if let Some(idx) = ctx.device_layout.index_for_name(Channel::Lfe) {
                    targets[c][idx] = source.direct.gain;
                }
            } else {
                let gains: Gains = pan_by_angle(ctx.device_layout, entry.azimuth, entry.elevation, source.direct.gain);
                targets[c] = gains;
            }
        }
        update_dry_stepping(&mut voice.direct.gains, &targets, num_chans, horizon);
    }

    voice.direct.moving = true;
    for c in 0..num_chans.min(MAX_INPUT_CHANS) {
        voice.direct.filters[c] = init_shelf_filters(source.direct.hf_reference, source.direct.lf_reference, source.direct.gain_hf, source.direct.gain_lf, ctx.device_freq as f32);
    }
}

/// `MixSource` (spec.md §4.8 step e): advances the voice's pitch
/// accumulator, pulls samples from `input`, applies shelf filters and gain
/// ramps, and accumulates into the voice's direct and send buses.
pub fn mix_source(
    voice: &mut Voice,
    input: &[f32],
    samples: usize,
    dry: &mut PlanarBuffer,
    real_channel_count: usize,
    sends: &mut [Option<&mut PlanarBuffer>],
) {
    let num_in = 1usize;
    let out_chans = voice.direct.out_channels.min(MAX_OUTPUT_CHANNELS);
    let num_sends = voice.num_sends;

    for s in 0..samples {
        // Both the direct path and every send read the same resampled
        // position for this tick, so they stay in lockstep with each other.
        let pos = (voice.accumulator.position as usize).min(input.len().saturating_sub(1));
        let raw_sample = input.get(pos).copied().unwrap_or(0.0);

        for in_chan in 0..num_in {
            let filters = &mut voice.direct.filters[in_chan];
            let mut sample = raw_sample;
            if filters.active & crate::filter::ActiveType::LOW_PASS.bits() != 0 {
                sample = filters.low_pass.process(sample);
            }
            if filters.active & crate::filter::ActiveType::HIGH_PASS.bits() != 0 {
                sample = filters.high_pass.process(sample);
            }

            for oc in 0..out_chans {
                let gain = &mut voice.direct.gains[in_chan][oc];
                let abs_channel = voice.direct.out_bus.absolute_channel(real_channel_count, oc);
                dry.channel_mut(abs_channel)[s] += sample * gain.current;
                gain.advance();
            }
        }

        for (i, send_buf) in sends.iter_mut().enumerate().take(num_sends) {
            let Some(buf) = send_buf else { continue };
            let send = &mut voice.sends[i];
            let mut sample = raw_sample;
            if send.filters.active & crate::filter::ActiveType::LOW_PASS.bits() != 0 {
                sample = send.filters.low_pass.process(sample);
            }
            if send.filters.active & crate::filter::ActiveType::HIGH_PASS.bits() != 0 {
                sample = send.filters.high_pass.process(sample);
            }
            buf.channel_mut(0)[s] += sample * send.gain.current;
            send.gain.advance();
        }

        voice.accumulator.position_frac += voice.step;
        voice.accumulator.position += (voice.accumulator.position_frac >> crate::tunables::FRACTIONBITS) as u64;
        voice.accumulator.position_frac &= FRACTIONONE - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // P7 — Doppler idempotence.
    #[test]
    fn doppler_passthrough_when_factor_zero() {
        let vel = Vec4::direction(10.0, 0.0, 0.0);
        let stl = Vec4::direction(1.0, 0.0, 0.0);
        assert_eq!(doppler_pitch(1.0, vel, vel, stl, 0.0), 1.0);
    }

    #[test]
    fn doppler_unchanged_for_equal_collinear_velocities() {
        let vel = Vec4::direction(5.0, 0.0, 0.0);
        let stl = Vec4::direction(1.0, 0.0, 0.0);
        let pitch = doppler_pitch(1.0, vel, vel, stl, 1.0);
        assert!((pitch - 1.0).abs() < 1e-5);
    }

    #[test]
    fn pitch_step_clamped_to_max_pitch() {
        let step = pitch_to_step(1000.0, 48000, 48000);
        assert_eq!(step, MAX_PITCH << crate::tunables::FRACTIONBITS);
    }

    #[test]
    fn pitch_step_is_at_least_one() {
        let step = pitch_to_step(0.0, 48000, 48000);
        assert_eq!(step, 1);
    }
}
