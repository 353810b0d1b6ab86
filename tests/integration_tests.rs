//! Integration Tests
//!
//! End-to-end tests for tracks, clip editing, the streaming decorator and
//! persistence.

use std::sync::Arc;
use std::thread;

use clipstream::clip::Clip;
use clipstream::config::EngineConfig;
use clipstream::engine::{export_wav, import_wav, ExportFormat};
use clipstream::persist::{TagRecorder, TrackReader};
use clipstream::storage::{InMemoryBlockFactory, SampleFormat};
use clipstream::stream::{render_range, StreamState, StretchingSequence, VarispeedFactory};
use clipstream::track::{ClipHandle, Track, TrackFactory};
use clipstream::{ClipstreamError, SampleCount};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn store() -> Arc<InMemoryBlockFactory> {
    Arc::new(InMemoryBlockFactory::with_capacity(3))
}

fn new_track(store: &Arc<InMemoryBlockFactory>, rate: u32, channels: usize) -> Track {
    TrackFactory::new(store.clone(), rate).create(channels).unwrap()
}

/// Place `samples` on every channel starting at `start` seconds
fn place(track: &mut Track, start: f64, samples: &[f32]) -> ClipHandle {
    let channels: Vec<&[f32]> = vec![samples; track.n_channels()];
    let clip = Clip::from_samples(
        Arc::clone(track.block_factory()),
        track.format(),
        track.rate(),
        start,
        &channels,
    )
    .unwrap();
    track.insert_clip(clip).unwrap()
}

fn read(track: &Track, start: SampleCount, len: usize, backwards: bool) -> Vec<f32> {
    let mut buf = vec![f32::NAN; len];
    track.read(0, &mut [buf.as_mut_slice()], start, len, backwards).unwrap();
    buf
}

fn pull(
    stream: &mut StretchingSequence<'_, Track>,
    start: SampleCount,
    len: usize,
    backwards: bool,
) -> Vec<f32> {
    stream.pull(start, len, backwards).unwrap().samples.remove(0)
}

fn gapped(store: &Arc<InMemoryBlockFactory>) -> Track {
    let mut track = new_track(store, 1, 1);
    place(&mut track, 0.0, &[1.0, 2.0]);
    place(&mut track, 5.0, &[6.0, 7.0]);
    track
}

// === Reads ===

#[test]
fn test_gapped_track_reads_silence_between_clips() {
    let store = store();
    let track = gapped(&store);
    let expected = vec![1.0, 2.0, 0.0, 0.0, 0.0, 6.0, 7.0, 0.0, 0.0, 0.0];

    assert_eq!(read(&track, 0, 10, false), expected);

    let mut stream = StretchingSequence::new(&track);
    assert_eq!(pull(&mut stream, 0, 10, false), expected);
    assert!(matches!(stream.state(), StreamState::Exhausted(_)));
}

#[test]
fn test_backward_reads_mirror_forward_reads() {
    let store = store();
    let mut track = new_track(&store, 1, 1);
    place(&mut track, 1.0, &[1.0, 2.0, 3.0, 4.0]);
    place(&mut track, 7.0, &[5.0, 6.0, 7.0]);
    place(&mut track, 10.0, &[8.0]);

    for (start, len) in [(0, 12), (2, 6), (5, 3), (9, 4)] {
        let mut forward = read(&track, start, len, false);
        forward.reverse();
        assert_eq!(read(&track, start + len as SampleCount, len, true), forward);

        let mut stream = StretchingSequence::new(&track);
        assert_eq!(pull(&mut stream, start + len as SampleCount, len, true), forward);
    }
}

#[test]
fn test_consecutive_pulls_match_one_pull() {
    let store = store();
    let track = gapped(&store);

    let mut whole = StretchingSequence::new(&track);
    let expected = pull(&mut whole, 0, 10, false);

    let mut parts = StretchingSequence::new(&track);
    let mut got = pull(&mut parts, 0, 4, false);
    got.extend(pull(&mut parts, 4, 6, false));
    assert_eq!(got, expected);

    let mut backward = StretchingSequence::new(&track);
    let mut got = pull(&mut backward, 10, 3, true);
    got.extend(pull(&mut backward, 7, 7, true));
    got.reverse();
    assert_eq!(got, expected);
}

#[test]
fn test_stereo_track_streams_every_channel() {
    let store = store();
    let mut track = new_track(&store, 1, 2);
    place(&mut track, 2.0, &[0.5, 0.25]);

    let mut stream = StretchingSequence::new(&track);
    let out = render_range(&mut stream, 0.0, 5.0, 2).unwrap();
    assert_eq!(out.channels(), 2);
    assert_eq!(out.samples[0], vec![0.0, 0.0, 0.5, 0.25, 0.0]);
    assert_eq!(out.samples[1], out.samples[0]);
}

// === Editing ===

#[test]
fn test_split_then_merge_restores_track() {
    let store = store();
    let mut track = new_track(&store, 1, 1);
    let ramp: Vec<f32> = (0..10).map(|i| i as f32).collect();
    place(&mut track, 0.0, &ramp);

    let right = track.split_at(4.0).unwrap().unwrap();
    assert_eq!(track.clip_count(), 2);
    assert_eq!(read(&track, 0, 10, false), ramp);

    let left = track.clip_at_time(0.0).unwrap();
    assert_eq!(track.clip(right).unwrap().start_time(), 4.0);
    let merged = track.merge_clips(left, right).unwrap();
    assert_eq!(merged, left);
    assert_eq!(track.clip_count(), 1);
    assert_eq!(read(&track, 0, 10, false), ramp);
}

fn assert_disjoint(track: &Track) {
    let tolerance = track.merge_tolerance();
    let clips = track.sorted_clips();
    for pair in clips.windows(2) {
        let (a, b) = (pair[0].1, pair[1].1);
        assert!(
            a.end_time() <= b.start_time() + tolerance,
            "[{}, {}) overlaps [{}, {})",
            a.start_time(),
            a.end_time(),
            b.start_time(),
            b.end_time()
        );
    }
}

#[test]
fn test_random_edits_keep_clips_disjoint() {
    let store = store();
    let mut track = new_track(&store, 10, 1);

    // Deterministic LCG
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |bound: u64| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) % bound
    };
    // Times between the 0.1 s sample boundaries
    let off_grid = |k: u64| k as f64 / 20.0 + 0.013;

    let mut merges = 0;
    for _ in 0..300 {
        let samples = vec![1.0; 1 + next(20) as usize];
        let clip = Clip::from_samples(
            Arc::clone(track.block_factory()),
            SampleFormat::Float32,
            10,
            off_grid(next(1000)),
            &[samples.as_slice()],
        )
        .unwrap();
        match track.insert_clip(clip) {
            Ok(_) | Err(ClipstreamError::Overlap { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }

        match next(5) {
            0 => {
                let Some(right) = track.split_at(off_grid(next(1000))).unwrap() else {
                    continue;
                };
                let clips = track.sorted_clips();
                let index = clips.iter().position(|(h, _)| *h == right).unwrap();
                let (left, left_clip) = clips[index - 1];
                let total = left_clip.num_samples() + clips[index].1.num_samples();
                assert_eq!(left_clip.end_time(), clips[index].1.start_time());
                if next(2) == 0 {
                    let merged = track.merge_clips(left, right).unwrap();
                    assert_eq!(track.clip(merged).unwrap().num_samples(), total);
                    merges += 1;
                }
            }
            1 => {
                let t0 = off_grid(next(1000));
                match track.join(t0, t0 + 1.0) {
                    Ok(_) | Err(ClipstreamError::Overlap { .. }) => {}
                    Err(other) => panic!("unexpected error: {:?}", other),
                }
            }
            2 => {
                let (t0, t1) = (off_grid(next(40)), 52.0 - off_grid(next(40)));
                track.trim(t0, t1).unwrap();
            }
            3 => {
                let clips = track.sorted_clips();
                if clips.is_empty() {
                    continue;
                }
                let (handle, clip) = clips[next(clips.len() as u64) as usize];
                let distance = next(40) as f64 / 7.0;
                let amount = if next(2) == 0 {
                    distance
                } else {
                    -distance.min(clip.start_time())
                };
                let allowed = track.max_offset(&[handle], amount).unwrap();
                assert!(allowed.abs() <= amount.abs());
                track.offset_clips(&[handle], allowed).unwrap();
            }
            _ => {}
        }
        assert_disjoint(&track);
    }
    assert!(merges > 0);
    assert!(track.clip_count() > 1);
}

#[test]
fn test_offset_limit_grows_monotonically() {
    let store = store();
    let mut track = new_track(&store, 1, 1);
    let moving = place(&mut track, 0.0, &[1.0, 1.0]);
    place(&mut track, 5.0, &[1.0, 1.0]);

    let mut previous = 0.0;
    for amount in [0.5, 1.0, 2.0, 3.0, 4.0, 10.0] {
        let allowed = track.max_offset(&[moving], amount).unwrap();
        assert!(allowed >= previous && allowed <= amount);
        assert!(allowed <= 3.0);
        previous = allowed;
    }
    assert!(track.can_offset(&[moving], 3.0).unwrap());
    assert!(!track.can_offset(&[moving], 3.5).unwrap());

    track.offset_clips(&[moving], 3.0).unwrap();
    assert_eq!(read(&track, 0, 7, false), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);

    let mut track = new_track(&store, 1, 1);
    place(&mut track, 0.0, &[1.0, 1.0]);
    let moving = place(&mut track, 6.0, &[1.0, 1.0]);

    let mut previous = 0.0;
    for amount in [-0.5, -1.0, -2.0, -4.0, -10.0] {
        let allowed = track.max_offset(&[moving], amount).unwrap();
        assert!(allowed <= previous && allowed >= amount);
        assert!(allowed >= -4.0);
        previous = allowed;
    }
    assert_eq!(previous, -4.0);
    assert!(track.can_offset(&[moving], -4.0).unwrap());
    assert!(!track.can_offset(&[moving], -4.5).unwrap());
}

// === Recording ===

#[test]
fn test_recording_from_several_threads() {
    let store = store();
    let mut track = new_track(&store, 100, 1);

    let handles: Vec<_> = (0..4)
        .map(|id| {
            let recorder = track.recorder();
            thread::spawn(move || {
                let block = [id as f32; 4];
                for _ in 0..25 {
                    recorder.append(&[block.as_slice()]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(track.pending_samples(), 400);
    assert_eq!(track.flush().unwrap(), 400);
    assert_eq!(track.pending_samples(), 0);
    assert_eq!(track.play_samples_count(), 400);

    let samples = read(&track, 0, 400, false);
    for id in 0..4 {
        assert_eq!(samples.iter().filter(|&&s| s == id as f32).count(), 100);
    }
}

// === Faults ===

#[test]
fn test_missing_block_reaches_the_caller() {
    let store = store();
    let track = gapped(&store);
    let (_, last) = track.sorted_clips()[1];
    assert!(store.discard(last.sequences()[0].blocks()[0].id));

    let mut buf = vec![0.0_f32; 10];
    let err = track.read(0, &mut [buf.as_mut_slice()], 0, 10, false).unwrap_err();
    assert!(matches!(err, ClipstreamError::MissingBlock { .. }));

    let mut stream = StretchingSequence::new(&track);
    assert!(stream.pull(0, 10, false).is_err());
    assert_eq!(stream.state(), StreamState::Uninitialized);

    // Data before the damaged clip is still readable
    assert_eq!(pull(&mut stream, 0, 3, false), vec![1.0, 2.0, 0.0]);
}

// === Transform ===

#[test]
fn test_varispeed_halves_duration() {
    let store = store();
    let mut track = new_track(&store, 1, 1);
    let ramp: Vec<f32> = (0..8).map(|i| i as f32).collect();
    place(&mut track, 0.0, &ramp);

    let factory = VarispeedFactory::new(2.0).unwrap();
    let mut stream =
        StretchingSequence::with_transform(&track, Box::new(factory)).with_chunk_size(3);
    assert!(stream.has_transform());
    assert_eq!(pull(&mut stream, 0, 6, false), vec![0.0, 2.0, 4.0, 6.0, 0.0, 0.0]);
}

// === Persistence and files ===

#[test]
fn test_tag_round_trip_rebuilds_track() {
    let store = store();
    let mut track = new_track(&store, 4, 2);
    track.set_name("Drums");
    place(&mut track, 0.5, &[0.1, 0.2, 0.3, 0.4, 0.5]);
    place(&mut track, 3.0, &[-0.5, 0.5]);
    track.split_at(1.0).unwrap();

    let mut recorder = TagRecorder::new();
    track.write_tags(&mut recorder).unwrap();
    let json = recorder.to_json().unwrap();
    let restored = TagRecorder::from_json(&json).unwrap();
    let rebuilt = TrackReader::read(store.clone(), &restored).unwrap();

    assert_eq!(rebuilt.name(), "Drums");
    assert_eq!(rebuilt.clip_count(), 3);
    for ((_, a), (_, b)) in track.sorted_clips().into_iter().zip(rebuilt.sorted_clips()) {
        assert_eq!(a.start_time().to_bits(), b.start_time().to_bits());
        assert_eq!(a.num_samples(), b.num_samples());
    }
    let mut left = vec![0.0_f32; 16];
    let mut right = vec![0.0_f32; 16];
    rebuilt
        .read(0, &mut [left.as_mut_slice(), right.as_mut_slice()], 0, 16, false)
        .unwrap();
    assert_eq!(left, read(&track, 0, 16, false));
    assert_eq!(right, left);
}

#[test]
fn test_config_and_render_through_files() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("engine.json");
    let config = EngineConfig {
        project_rate: 8000,
        max_block_samples: 64,
        verify_block_checksums: true,
        ..EngineConfig::default()
    };
    config.save(&config_path).unwrap();
    let loaded = EngineConfig::load(&config_path).unwrap();
    assert_eq!(loaded, config);

    let factory = TrackFactory::from_config(&loaded).unwrap();
    let mut track = factory.create(1).unwrap();
    let tone: Vec<f32> = (0..800).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
    place(&mut track, 0.1, &tone);

    let mut stream = StretchingSequence::new(&track).with_config(&loaded);
    let rendered = render_range(&mut stream, 0.0, track.end_time(), 256).unwrap();
    assert_eq!(rendered.len(), 1600);

    let wav = dir.path().join("render.wav");
    export_wav(&rendered, &wav, ExportFormat::float()).unwrap();
    let back = import_wav(&wav).unwrap();
    assert_eq!(back.sample_rate, 8000);
    assert_eq!(back.samples, rendered.samples);
}
