//! Streaming Benchmarks
//!
//! Throughput of track reads and the streaming decorator.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use clipstream::clip::Clip;
use clipstream::storage::InMemoryBlockFactory;
use clipstream::stream::{render_range, StretchingSequence, VarispeedFactory};
use clipstream::track::{Track, TrackFactory};

/// Ten one-second clips with half-second gaps, stereo at 44.1 kHz
fn gapped_track() -> Track {
    let factory = TrackFactory::new(Arc::new(InMemoryBlockFactory::new()), 44100);
    let mut track = factory.create(2).unwrap();
    let tone: Vec<f32> = (0..44100).map(|i| (i as f32 * 0.0627).sin() * 0.5).collect();
    for n in 0..10 {
        let clip = Clip::from_samples(
            Arc::clone(track.block_factory()),
            track.format(),
            track.rate(),
            n as f64 * 1.5,
            &[tone.as_slice(), tone.as_slice()],
        )
        .unwrap();
        track.insert_clip(clip).unwrap();
    }
    track
}

fn benchmark_track_read(c: &mut Criterion) {
    let track = gapped_track();
    let mut left = vec![0.0_f32; 4096];
    let mut right = vec![0.0_f32; 4096];

    c.bench_function("track_read_4096_stereo", |b| {
        b.iter(|| {
            track
                .read(
                    0,
                    &mut [left.as_mut_slice(), right.as_mut_slice()],
                    black_box(60000),
                    4096,
                    false,
                )
                .unwrap();
        })
    });
}

fn benchmark_stream_render(c: &mut Criterion) {
    let track = gapped_track();
    let end = track.end_time();

    c.bench_function("stream_render_forward", |b| {
        b.iter(|| {
            let mut stream = StretchingSequence::new(&track);
            render_range(&mut stream, 0.0, black_box(end), 4096).unwrap();
        })
    });

    c.bench_function("stream_render_varispeed", |b| {
        b.iter(|| {
            let factory = VarispeedFactory::new(1.25).unwrap();
            let mut stream = StretchingSequence::with_transform(&track, Box::new(factory));
            render_range(&mut stream, 0.0, black_box(end / 1.25), 4096).unwrap();
        })
    });
}

criterion_group!(benches, benchmark_track_read, benchmark_stream_render);
criterion_main!(benches);
