use criterion::{black_box, criterion_group, criterion_main, Criterion};

use spatialmix::backend::{NullBackend, NullSynth};
use spatialmix::buffer::{BufferFormat, SourceBuffer};
use spatialmix::device::{mix_cycle, Context, Device, VoiceSlot};
use spatialmix::effect::EffectSlot;
use spatialmix::format::SampleFormat;
use spatialmix::listener::{update_listener_params, Listener};
use spatialmix::pan::ChannelLayout;
use spatialmix::source::{DistanceModel, Source};
use spatialmix::tunables::{Tunables, BUFFERSIZE, MAX_SENDS};
use spatialmix::voice::{update_voice_spatial, SpatialUpdateCtx, Voice};

fn spatial_update_bench(_dummy: usize) -> Voice {
    let listener = Listener::default();
    let params = update_listener_params(&listener);
    let source = Source { reference_distance: 1.0, max_distance: 50.0, ..Source::default() };
    let buffer = SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono };
    let layout = ChannelLayout::five_point_one();
    let tunables = Tunables::default();
    let mut voice = Voice::default();
    let effect_slots: [Option<&EffectSlot>; MAX_SENDS] = Default::default();
    let ctx = SpatialUpdateCtx {
        source: &source,
        listener: &params,
        head_buffer: &buffer,
        device_freq: 48_000,
        device_layout: &layout,
        hrtf: None,
        effect_slots,
        num_sends: 0,
        tunables: &tunables,
        context_distance_model: DistanceModel::InverseClamped,
        source_distance_model: true,
    };
    update_voice_spatial(&mut voice, &ctx);
    voice
}

fn mix_cycle_bench(voice_count: usize) -> Device {
    let (mut device, _rx) = Device::new(48_000, ChannelLayout::five_point_one(), SampleFormat::Int16).unwrap();
    let mut ctx = Context::new();
    for _ in 0..voice_count {
        let mut slot = VoiceSlot::default();
        slot.voice.has_source = true;
        slot.state = spatialmix::device::SourceState::Playing;
        slot.source = Some(Source { reference_distance: 1.0, max_distance: 50.0, ..Source::default() });
        slot.source_buffer = Some(SourceBuffer { sample_rate: 48_000, format: BufferFormat::Mono });
        slot.samples = vec![0.25_f32; BUFFERSIZE * 4];
        ctx.voices.push(slot);
    }
    let mut contexts = vec![ctx];
    mix_cycle(&mut device, &NullBackend, &mut NullSynth, &mut contexts, None, BUFFERSIZE);
    device
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("spatial_update", |b| b.iter(|| spatial_update_bench(black_box(0))));
    c.bench_function("mix_cycle_1_voice", |b| b.iter(|| mix_cycle_bench(black_box(1))));
    c.bench_function("mix_cycle_32_voices", |b| b.iter(|| mix_cycle_bench(black_box(32))));
    c.bench_function("mix_cycle_128_voices", |b| b.iter(|| mix_cycle_bench(black_box(128))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
