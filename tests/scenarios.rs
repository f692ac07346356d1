//! End-to-end scenarios exercising the voice updater and mix loop together.

use spatialmix::backend::{NullBackend, NullSynth};
use spatialmix::buffer::{BufferFormat, PlanarBuffer, SourceBuffer};
use spatialmix::device::{handle_disconnect, mix_cycle, Context, Device, SourceState, VoiceSlot};
use spatialmix::effect::{EffectSlot, EffectState, ReverbProperties};
use spatialmix::format::SampleFormat;
use spatialmix::hrtf::HrtfSet;
use spatialmix::listener::{update_listener_params, Listener};
use spatialmix::math::Vec4;
use spatialmix::pan::ChannelLayout;
use spatialmix::source::{DistanceModel, Source};
use spatialmix::tunables::{Tunables, BUFFERSIZE, MAX_SENDS};
use spatialmix::voice::{update_voice_nonspatial, update_voice_spatial, NonSpatialUpdateCtx, SpatialUpdateCtx, Voice};

fn default_effect_slots<'a>() -> [Option<&'a EffectSlot>; MAX_SENDS] {
    Default::default()
}

// S1 — mono, head-relative, centered: equal gain on both stereo channels.
#[test]
fn mono_centered_source_mixes_equally_to_both_channels() {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let source = Source {
        head_relative: true,
        position: Vec4::point(0.0, 0.0, -2.0),
        reference_distance: 1.0,
        ..Source::default()
    };
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };
    let layout = ChannelLayout::stereo();
    let tunables = Tunables::default();
    let mut voice = Voice::default();
    let ctx = SpatialUpdateCtx {
        source: &source,
        listener: &params,
        head_buffer: &buffer,
        device_freq: 48_000,
        device_layout: &layout,
        hrtf: None,
        effect_slots: default_effect_slots(),
        num_sends: 0,
        tunables: &tunables,
        context_distance_model: DistanceModel::InverseClamped,
        source_distance_model: true,
    };
    update_voice_spatial(&mut voice, &ctx);

    let mut dry = PlanarBuffer::new();
    dry.zero(2, 64);
    let samples = vec![1.0_f32; 64];
    spatialmix::voice::mix_source(&mut voice, &samples, 64, &mut dry, 2, &mut []);

    let left: f32 = dry.channel(0)[..64].iter().sum();
    let right: f32 = dry.channel(1)[..64].iter().sum();
    assert!((left - right).abs() < 1e-3, "left={left} right={right}");
    assert!(left > 0.0);
}

// S2 — inverse distance attenuation, Doppler off: moving away from the
// listener only changes gain, never pitch.
#[test]
fn inverse_distance_attenuation_without_doppler_leaves_pitch_unchanged() {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let layout = ChannelLayout::stereo();
    let tunables = Tunables::default();
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };

    let near = Source {
        head_relative: true,
        position: Vec4::point(0.0, 0.0, -2.0),
        velocity: Vec4::direction(0.0, 0.0, -5.0),
        doppler_factor: 0.0,
        distance_model: Some(DistanceModel::InverseClamped),
        reference_distance: 1.0,
        max_distance: 100.0,
        ..Source::default()
    };
    let far = Source { position: Vec4::point(0.0, 0.0, -20.0), ..near.clone() };

    let mut near_voice = Voice::default();
    let mut far_voice = Voice::default();
    for (source, voice) in [(&near, &mut near_voice), (&far, &mut far_voice)] {
        let ctx = SpatialUpdateCtx {
            source,
            listener: &params,
            head_buffer: &buffer,
            device_freq: 48_000,
            device_layout: &layout,
            hrtf: None,
            effect_slots: default_effect_slots(),
            num_sends: 0,
            tunables: &tunables,
            context_distance_model: DistanceModel::InverseClamped,
            source_distance_model: true,
        };
        update_voice_spatial(voice, &ctx);
    }

    assert_eq!(near_voice.step, far_voice.step);
    let near_gain = near_voice.direct.gains[0][0].target.abs() + near_voice.direct.gains[0][1].target.abs();
    let far_gain = far_voice.direct.gains[0][0].target.abs() + far_voice.direct.gains[0][1].target.abs();
    assert!(far_gain < near_gain, "far={far_gain} near={near_gain}");
}

// S3 — stereo-wide non-spatial source panned onto a stereo device with no
// HRTF active: left input stays left, right stays right, unattenuated.
#[test]
fn stereo_wide_nonspatial_source_keeps_channels_separated() {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let layout = ChannelLayout::stereo();
    let source = Source::default();
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Stereo };
    let mut voice = Voice::default();
    let ctx = NonSpatialUpdateCtx {
        source: &source,
        listener: &params,
        head_buffer: &buffer,
        device_freq: 48_000,
        device_layout: &layout,
        device_is_stereo_no_hrtf: true,
        hrtf: None,
    };
    update_voice_nonspatial(&mut voice, &ctx);

    let left_gains = voice.direct.gains[0];
    let right_gains = voice.direct.gains[1];
    assert!(left_gains[0].target > 0.9);
    assert!(left_gains[1].target < 1e-3);
    assert!(right_gains[1].target > 0.9);
    assert!(right_gains[0].target < 1e-3);
}

struct StubHrtf;

impl HrtfSet for StubHrtf {
    fn nearest_four(&self, _elev: f32, _az: f32) -> [spatialmix::hrtf::HrtfGridPoint; 4] {
        let mut coeffs = [[0.0_f32; 2]; spatialmix::tunables::HRIR_LENGTH];
        coeffs[0] = [1.0, 1.0];
        let zero = [[0.0_f32; 2]; spatialmix::tunables::HRIR_LENGTH];
        [(coeffs, [0, 0], 1.0), (zero, [0, 0], 0.0), (zero, [0, 0], 0.0), (zero, [0, 0], 0.0)]
    }

    fn sample_rate(&self) -> u32 {
        48_000
    }
}

// S4 — first HRTF update for a fresh voice snaps to target coefficients
// instead of fading, since `Direct.Moving` starts false.
#[test]
fn first_hrtf_update_snaps_without_fade_counter() {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let layout = ChannelLayout::stereo();
    let tunables = Tunables::default();
    let source = Source {
        head_relative: true,
        position: Vec4::point(1.0, 0.0, -1.0),
        reference_distance: 1.0,
        ..Source::default()
    };
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };
    let hrtf = StubHrtf;
    let mut voice = Voice::default();
    assert!(!voice.direct.moving);

    let ctx = SpatialUpdateCtx {
        source: &source,
        listener: &params,
        head_buffer: &buffer,
        device_freq: 48_000,
        device_layout: &layout,
        hrtf: Some(&hrtf),
        effect_slots: default_effect_slots(),
        num_sends: 0,
        tunables: &tunables,
        context_distance_model: DistanceModel::InverseClamped,
        source_distance_model: true,
    };
    update_voice_spatial(&mut voice, &ctx);

    assert_eq!(voice.direct.counter, 0);
    assert!(voice.direct.hrtf[0].coeffs[0][0] > 0.0);
}

// S5 — disconnect during playback: the mixer keeps ticking silence and every
// voice is drained rather than left dangling.
#[test]
fn disconnect_mid_playback_produces_silence_on_subsequent_ticks() {
    let (mut device, _rx) = Device::new(48_000, ChannelLayout::stereo(), SampleFormat::Int16).unwrap();
    let mut ctx = Context::new();
    let mut slot = VoiceSlot::default();
    slot.voice.has_source = true;
    slot.state = SourceState::Playing;
    slot.source = Some(Source { reference_distance: 1.0, ..Source::default() });
    slot.source_buffer = Some(SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono });
    slot.samples = vec![1.0_f32; BUFFERSIZE * 4];
    ctx.voices.push(slot);
    let mut contexts = vec![ctx];

    mix_cycle(&mut device, &NullBackend, &mut NullSynth, &mut contexts, None, BUFFERSIZE);
    assert_eq!(contexts[0].voice_count(), 1);

    handle_disconnect(&mut device, &mut contexts);
    assert!(!device.connected);
    assert_eq!(contexts[0].voice_count(), 0);

    // A tick after disconnect must not panic and leaves the dry bus silent.
    mix_cycle(&mut device, &NullBackend, &mut NullSynth, &mut contexts, None, BUFFERSIZE);
    let silent = device.dry.channel(0)[..BUFFERSIZE].iter().all(|&s| s == 0.0);
    assert!(silent);
}

struct StubReverb {
    properties: ReverbProperties,
}

impl EffectState for StubReverb {
    fn update(&mut self, _device_freq: u32) {}

    fn process(&mut self, _samples: usize, _wet_in: &PlanarBuffer, _dry_out: &mut PlanarBuffer, _num_channels: usize) {}

    fn reverb_properties(&self) -> Option<ReverbProperties> {
        Some(self.properties)
    }
}

// S6 — a send marked `AuxSendAuto` consults the reverb's own rolloff instead
// of the source's, so its distance falloff differs from the dry path's.
#[test]
fn aux_send_auto_uses_reverb_room_rolloff_not_source_rolloff() {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let layout = ChannelLayout::stereo();
    let tunables = Tunables::default();
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };

    let mut source = Source {
        head_relative: true,
        position: Vec4::point(0.0, 0.0, -4.0),
        reference_distance: 1.0,
        max_distance: 100.0,
        rolloff_factor: 1.0,
        room_rolloff_factor: 0.0,
        ..Source::default()
    };
    source.num_sends = 1;
    source.sends[0].gain = 1.0;
    source.sends[0].gain_hf = 1.0;
    source.send_auto[0].wet_gain_auto = true;

    let reverb = StubReverb { properties: ReverbProperties { decay_time: 1.5, room_rolloff_factor: 9.0, air_absorption_gain_hf: 0.99 } };
    let slot = EffectSlot::new(Box::new(reverb));

    let mut voice = Voice::default();
    let effect_slots: [Option<&EffectSlot>; MAX_SENDS] = {
        let mut arr: [Option<&EffectSlot>; MAX_SENDS] = Default::default();
        arr[0] = Some(&slot);
        arr
    };
    let ctx = SpatialUpdateCtx {
        source: &source,
        listener: &params,
        head_buffer: &buffer,
        device_freq: 48_000,
        device_layout: &layout,
        hrtf: None,
        effect_slots,
        num_sends: 1,
        tunables: &tunables,
        context_distance_model: DistanceModel::InverseClamped,
        source_distance_model: true,
    };
    update_voice_spatial(&mut voice, &ctx);

    let dry_gain = voice.direct.gains[0][0].target.abs() + voice.direct.gains[0][1].target.abs();
    let wet_gain = voice.sends[0].gain.target;
    assert!(wet_gain > 0.0);
    // With a much steeper room rolloff than the source's own, the wet path
    // should not simply track the dry path's attenuation.
    assert!((wet_gain - dry_gain).abs() > 1e-6);
}
