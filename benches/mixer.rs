use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::net::SocketAddr;

use wand_relay::audio::mixer::{collect_tick, mix_chunks, Crossfader};
use wand_relay::clients::{BufferSettings, ClientRegistry};
use wand_relay::constants::{DEFAULT_AUDIO_SAMPLES, DEFAULT_FADE_LENGTH};

fn packet(offset: usize) -> Vec<i16> {
    (0..DEFAULT_AUDIO_SAMPLES)
        .map(|i| (10_000.0 * (0.2 * (offset + i) as f32).sin()) as i16)
        .collect()
}

fn bench_crossfade(c: &mut Criterion) {
    let mut fader = Crossfader::new(DEFAULT_FADE_LENGTH);
    let input = packet(0);
    c.bench_function("crossfade_512", |b| b.iter(|| fader.process(black_box(&input))));
}

fn bench_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_chunks");
    for wands in [1usize, 4, 16] {
        let chunks: Vec<Vec<i32>> = (0..wands)
            .map(|w| packet(w * 7).into_iter().map(i32::from).collect())
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(wands), &chunks, |b, chunks| {
            b.iter(|| mix_chunks(black_box(chunks)))
        });
    }
    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let registry = ClientRegistry::new(BufferSettings {
        buffer_limit: 1,
        max_queue_depth: 1024,
        fade_length: DEFAULT_FADE_LENGTH,
    });
    let addrs: Vec<SocketAddr> = (0..8)
        .map(|i| format!("10.0.0.{}:5005", i + 1).parse().unwrap())
        .collect();
    for addr in &addrs {
        registry.register(*addr);
    }
    let input = packet(0);

    c.bench_function("tick_8_wands", |b| {
        b.iter(|| {
            for addr in &addrs {
                registry.enqueue(addr, input.clone());
                registry.enqueue(addr, input.clone());
            }
            let chunks = collect_tick(&registry);
            let mixed = mix_chunks(&chunks);
            // Drain the second packet so queues stay bounded
            collect_tick(&registry);
            black_box(mixed)
        })
    });
}

criterion_group!(benches, bench_crossfade, bench_mix, bench_tick);
criterion_main!(benches);
