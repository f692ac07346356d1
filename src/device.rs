//! Device state and `MixCycle`, the per-device tick (spec.md §4.8).

use core::sync::atomic::{AtomicU32, Ordering};

use thingbuf::mpsc::blocking::{channel, Receiver, Sender};

use crate::backend::{Backend, Synth};
use crate::buffer::PlanarBuffer;
use crate::effect::EffectSlot;
use crate::error::MixerError;
use crate::flags::UpdateFlag;
use crate::format::{write_mono_int16, SampleFormat};
use crate::hrtf::HrtfSet;
use crate::listener::{update_listener_params, Listener, ListenerParams};
use crate::pan::ChannelLayout;
use crate::source::{DistanceModel, Source};
use crate::tunables::{Tunables, DEVICE_CLOCK_RES, MAX_OUTPUT_CHANNELS, MAX_SENDS};
use crate::voice::{mix_source, update_voice_nonspatial, update_voice_spatial, NonSpatialUpdateCtx, SpatialUpdateCtx, Voice};
use crate::buffer::{BufferFormat, SourceBuffer};

/// A monotonic seqlock counter, bumped before and after each tick so
/// observers can detect torn reads (spec.md §4.8 / §5 / P11).
#[derive(Default)]
pub struct MixCount(AtomicU32);

impl MixCount {
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Runs `snapshot` in a retry loop until it observes the counter even
    /// and unchanged across the read, guaranteeing it did not race a tick
    /// (spec.md §5's seqlock discipline / P11).
    pub fn read_consistent<T>(&self, mut snapshot: impl FnMut() -> T) -> T {
        loop {
            let c1 = self.load();
            let value = snapshot();
            let c2 = self.load();
            if c1 == c2 && c1 % 2 == 0 {
                return value;
            }
        }
    }
}

/// One source bound to a context, with the playback state the mixer reads
/// to decide whether to keep mixing, detach, or skip (spec.md §5).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Playing,
    Paused,
}

/// A voice slot plus the bookkeeping the mix loop needs around it: the
/// source's playback state, its dirty flag, and (owned by the context, not
/// the voice) the source's logical parameters.
pub struct VoiceSlot {
    pub voice: Voice,
    pub state: SourceState,
    pub needs_update: UpdateFlag,
    pub source: Option<Source>,
    pub source_buffer: Option<SourceBuffer>,
    pub samples: Vec<f32>,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            state: SourceState::Stopped,
            needs_update: UpdateFlag::new(true),
            source: None,
            source_buffer: None,
            samples: Vec::new(),
        }
    }
}

/// One playback context: a listener plus the voices bound to it.
pub struct Context {
    pub listener: Listener,
    pub listener_params: ListenerParams,
    pub update_sources: UpdateFlag,
    pub defer_updates: UpdateFlag,
    pub voices: Vec<VoiceSlot>,
    /// The context's own distance model, used for every source unless
    /// `source_distance_model` is enabled and the source overrides it
    /// (spec.md §4.6 step 4).
    pub distance_model: DistanceModel,
    /// Mirrors `AL_SOURCE_DISTANCE_MODEL`: off by default, matching the
    /// original's default of always using the context's model.
    pub source_distance_model: bool,
}

impl Context {
    pub fn new() -> Self {
        let listener = Listener::default();
        let listener_params = update_listener_params(&listener);
        Self {
            listener,
            listener_params,
            update_sources: UpdateFlag::new(true),
            defer_updates: UpdateFlag::new(false),
            voices: Vec::new(),
            distance_model: DistanceModel::InverseClamped,
            source_distance_model: false,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.voice.has_source).count()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// A device tick's output destination and backend (spec.md §3 / §6).
pub struct Device {
    pub freq: u32,
    pub layout: ChannelLayout,
    pub num_channels: usize,
    pub dry: PlanarBuffer,
    pub hrtf: Option<Box<dyn HrtfSet>>,
    pub effect_slots: Vec<EffectSlot>,
    pub default_slot: Option<EffectSlot>,
    pub clock_base: u64,
    pub samples_done: u64,
    pub mix_count: MixCount,
    /// Mono downmix producer: one chunk sent per tick, non-blocking so a
    /// slow or absent consumer never stalls the mix loop (spec.md §6's
    /// loopback capture device).
    pub loopback: Sender<Vec<i16>>,
    pub sample_format: SampleFormat,
    pub connected: bool,
    pub tunables: Tunables,
}

/// Depth of the loopback ring, in ticks: enough to absorb a consumer that is
/// briefly slower than real time without the mixer blocking.
const LOOPBACK_RING_CAPACITY: usize = 16;

impl Device {
    /// Builds a device and its loopback receiver. The receiver is the only
    /// way to drain `loopback`; drop it to let the mixer's sends no-op.
    ///
    /// Fails if `layout` has no channels or more than `MAX_OUTPUT_CHANNELS`
    /// (spec.md §6's producer-facing validation).
    pub fn new(freq: u32, layout: ChannelLayout, sample_format: SampleFormat) -> Result<(Self, Receiver<Vec<i16>>), MixerError> {
        let num_channels = layout.num_channels();
        if num_channels == 0 {
            return Err(MixerError::NoOutputChannels);
        }
        if num_channels > MAX_OUTPUT_CHANNELS {
            return Err(MixerError::TooManyOutputChannels(num_channels));
        }
        let (tx, rx) = channel(LOOPBACK_RING_CAPACITY);
        Ok((
            Self {
                freq,
                layout,
                num_channels,
                dry: PlanarBuffer::new(),
                hrtf: None,
                effect_slots: Vec::new(),
                default_slot: None,
                clock_base: 0,
                samples_done: 0,
                mix_count: MixCount::default(),
                loopback: tx,
                sample_format,
                connected: true,
                tunables: Tunables::default(),
            },
            rx,
        ))
    }

    /// Current monotonic clock, in `DEVICE_CLOCK_RES` units (spec.md §6).
    pub fn clock_now(&self) -> u64 {
        self.clock_base + self.samples_done * DEVICE_CLOCK_RES / self.freq as u64
    }

    /// Attaches an HRTF data set, failing if it was captured at a different
    /// sample rate than this device runs at (spec.md §4.3).
    pub fn attach_hrtf(&mut self, hrtf: Box<dyn HrtfSet>) -> Result<(), MixerError> {
        if hrtf.sample_rate() != self.freq {
            return Err(MixerError::HrtfSampleRateMismatch { set_rate: hrtf.sample_rate(), device_rate: self.freq });
        }
        self.hrtf = Some(hrtf);
        Ok(())
    }
}

/// Validates a send index against `MAX_SENDS` before a producer wires a
/// source's send into an effect slot (spec.md §3).
pub fn validate_send_index(index: usize) -> Result<(), MixerError> {
    if index >= MAX_SENDS {
        Err(MixerError::SendOutOfRange(index))
    } else {
        Ok(())
    }
}

/// Runs one device tick: zeroes buffers, runs the synth, updates and mixes
/// every voice in every context, runs effect processing, optionally renders
/// HRTF or crossfeed, converts to the backend format, and writes a mono
/// downmix to the loopback ring (spec.md §4.8).
///
/// `out` receives interleaved samples in the device's sample format when
/// `Some`; pass `None` to mix without producing backend output (e.g. while
/// only the loopback ring is being consumed).
pub fn mix_cycle(
    device: &mut Device,
    backend: &dyn Backend,
    synth: &mut dyn Synth,
    contexts: &mut [Context],
    mut out_i16: Option<&mut [i16]>,
    mut total_samples: usize,
) {
    use crate::tunables::BUFFERSIZE;

    let mut out_offset = 0usize;

    while total_samples > 0 {
        device.mix_count.bump();

        let samples_to_do = total_samples.min(BUFFERSIZE);
        let real_channels = device.num_channels;
        let total_bus_channels = if device.hrtf.is_some() { real_channels + 2 } else { real_channels };
        device.dry.zero(total_bus_channels, samples_to_do);

        backend.lock();

        synth.process(samples_to_do, &mut device.dry, real_channels);

        for ctx in contexts.iter_mut() {
            let deferred = ctx.defer_updates.get();
            let sources_dirty = if !deferred { ctx.update_sources.consume() } else { false };
            if sources_dirty {
                ctx.listener_params = update_listener_params(&ctx.listener);
            }

            for slot in ctx.voices.iter_mut() {
                if !slot.voice.has_source {
                    continue;
                }
                if slot.state == SourceState::Stopped {
                    slot.voice.detach();
                    continue;
                }

                if !deferred {
                    let needs_update = slot.needs_update.consume();
                    if needs_update || sources_dirty {
                        if let (Some(source), Some(buffer)) = (&slot.source, &slot.source_buffer) {
                            if buffer.format == crate::buffer::BufferFormat::Mono && !source.direct_channels {
                                let effect_refs: [Option<&EffectSlot>; MAX_SENDS] =
                                    core::array::from_fn(|i| device.effect_slots.get(i));
                                let ctx_spatial = SpatialUpdateCtx {
                                    source,
                                    listener: &ctx.listener_params,
                                    head_buffer: buffer,
                                    device_freq: device.freq,
                                    device_layout: &device.layout,
                                    hrtf: device.hrtf.as_deref(),
                                    effect_slots: effect_refs,
                                    num_sends: device.effect_slots.len().min(MAX_SENDS),
                                    tunables: &device.tunables,
                                    context_distance_model: ctx.distance_model,
                                    source_distance_model: ctx.source_distance_model,
                                };
                                update_voice_spatial(&mut slot.voice, &ctx_spatial);
                            } else {
                                let ctx_nonspatial = NonSpatialUpdateCtx {
                                    source,
                                    listener: &ctx.listener_params,
                                    head_buffer: buffer,
                                    device_freq: device.freq,
                                    device_layout: &device.layout,
                                    device_is_stereo_no_hrtf: real_channels == 2 && device.hrtf.is_none(),
                                    hrtf: device.hrtf.as_deref(),
                                };
                                update_voice_nonspatial(&mut slot.voice, &ctx_nonspatial);
                            }
                        }
                    }
                }

                if slot.state != SourceState::Paused {
                    let mut sends: [Option<&mut PlanarBuffer>; MAX_SENDS] = Default::default();
                    for (i, effect_slot) in device.effect_slots.iter_mut().enumerate().take(MAX_SENDS) {
                        sends[i] = Some(&mut effect_slot.wet_buffer);
                    }
                    mix_source(&mut slot.voice, &slot.samples, samples_to_do, &mut device.dry, real_channels, &mut sends);
                }
            }
        }

        for effect_slot in device.effect_slots.iter_mut() {
            if effect_slot.needs_update.consume() {
                effect_slot.state.update(device.freq);
            }
            effect_slot.state.process(samples_to_do, &effect_slot.wet_buffer, &mut device.dry, real_channels);
            effect_slot.wet_buffer.zero(real_channels, samples_to_do);
        }
        if let Some(default_slot) = device.default_slot.as_mut() {
            if default_slot.needs_update.consume() {
                default_slot.state.update(device.freq);
            }
            default_slot.state.process(samples_to_do, &default_slot.wet_buffer, &mut device.dry, real_channels);
            default_slot.wet_buffer.zero(real_channels, samples_to_do);
        }

        device.samples_done += samples_to_do as u64;
        device.clock_base += device.samples_done / device.freq as u64 * DEVICE_CLOCK_RES;
        device.samples_done %= device.freq as u64;

        backend.unlock();

        // HRTF/crossfeed post-processing on the virtual binaural channels is
        // dispatched through CPU-feature-specific kernels external to this
        // core (spec.md §1); when HRTF is off and no crossfeed is configured
        // the real output channels already hold the final mix.

        if let Some(out) = out_i16.as_deref_mut() {
            let refs: Vec<&[f32]> = (0..real_channels).map(|c| device.dry.channel(c)).collect();
            let end = out_offset + samples_to_do * real_channels;
            crate::format::write_int16(&refs, &mut out[out_offset..end], samples_to_do, real_channels);
            out_offset = end;
        }

        let refs: Vec<&[f32]> = (0..real_channels).map(|c| device.dry.channel(c)).collect();
        let mut mono = vec![0_i16; samples_to_do];
        write_mono_int16(&refs, &mut mono, samples_to_do, real_channels);
        let _ = device.loopback.try_send(mono);

        total_samples -= samples_to_do;
        device.mix_count.bump();
    }
}

/// `aluHandleDisconnect` (spec.md §5): clears `device.connected`, detaches
/// every voice, forces every playing source to `Stopped` at the origin, and
/// resets voice counts. Subsequent ticks still run and produce silence.
/// Sweeps every context/voice unconditionally, matching the original's
/// unconditional loop (spec.md §3 Supplemented Features).
pub fn handle_disconnect(device: &mut Device, contexts: &mut [Context]) {
    device.connected = false;
    for ctx in contexts.iter_mut() {
        for slot in ctx.voices.iter_mut() {
            slot.voice.detach();
            if slot.state == SourceState::Playing || slot.state == SourceState::Paused {
                slot.state = SourceState::Stopped;
                if let Some(source) = slot.source.as_mut() {
                    source.position = crate::math::Vec4::point(0.0, 0.0, 0.0);
                }
            }
        }
    }
    log::warn!("device disconnected, all voices drained");
}

#[allow(dead_code)]
fn buffer_format_channels(format: BufferFormat) -> usize {
    format.num_channels()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, NullSynth};

    #[test]
    fn mix_count_is_even_after_a_full_tick() {
        let (mut device, _rx) = Device::new(48_000, ChannelLayout::stereo(), SampleFormat::Int16).unwrap();
        let mut contexts = vec![Context::new()];
        mix_cycle(&mut device, &NullBackend, &mut NullSynth, &mut contexts, None, 256);
        assert_eq!(device.mix_count.load() % 2, 0);
    }

    // P11 — mix-count seqlock.
    #[test]
    fn read_consistent_never_observes_odd_count() {
        let (mut device, _rx) = Device::new(48_000, ChannelLayout::stereo(), SampleFormat::Int16).unwrap();
        let mut contexts = vec![Context::new()];
        mix_cycle(&mut device, &NullBackend, &mut NullSynth, &mut contexts, None, 1024);
        let value = device.mix_count.read_consistent(|| device.mix_count.load());
        assert_eq!(value % 2, 0);
    }

    // P12 — disconnect drains.
    #[test]
    fn disconnect_drains_all_voices_and_stops_sources() {
        let (mut device, _rx) = Device::new(48_000, ChannelLayout::stereo(), SampleFormat::Int16).unwrap();
        let mut ctx = Context::new();
        for _ in 0..3 {
            let mut slot = VoiceSlot::default();
            slot.voice.has_source = true;
            slot.state = SourceState::Playing;
            slot.source = Some(Source { position: crate::math::Vec4::point(1.0, 2.0, 3.0), ..Source::default() });
            ctx.voices.push(slot);
        }
        let mut contexts = vec![ctx];
        handle_disconnect(&mut device, &mut contexts);
        assert!(!device.connected);
        assert_eq!(contexts[0].voice_count(), 0);
        for slot in &contexts[0].voices {
            assert_eq!(slot.state, SourceState::Stopped);
            assert_eq!(slot.source.as_ref().unwrap().position, crate::math::Vec4::point(0.0, 0.0, 0.0));
        }
    }

    // S1 — mono, head-relative, centered.
    #[test]
    fn mono_head_relative_centered_pans_equally() {
        let (device, _rx) = Device::new(48_000, ChannelLayout::stereo(), SampleFormat::Int16).unwrap();
        let listener = Listener::default();
        let params = update_listener_params(&listener);
        let source = Source { head_relative: true, reference_distance: 1.0, ..Source::default() };
        let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };
        let mut voice = Voice::default();
        let effect_slots: [Option<&EffectSlot>; MAX_SENDS] = Default::default();
        let ctx = SpatialUpdateCtx {
            source: &source,
            listener: &params,
            head_buffer: &buffer,
            device_freq: device.freq,
            device_layout: &device.layout,
            hrtf: None,
            effect_slots,
            num_sends: 0,
            tunables: &device.tunables,
            context_distance_model: DistanceModel::InverseClamped,
            source_distance_model: false,
        };
        update_voice_spatial(&mut voice, &ctx);
        let left = voice.direct.gains[0][0].target;
        let right = voice.direct.gains[0][1].target;
        assert!((left - right).abs() < 1e-5);
    }
}
