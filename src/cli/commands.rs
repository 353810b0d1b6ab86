//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::clip::Clip;
use crate::config::EngineConfig;
use crate::engine::{export_wav, import_wav_at, ExportFormat};
use crate::error::{ClipstreamError, Result};
use crate::persist::TagRecorder;
use crate::stream::{render_range, render_range_reversed, StretchingSequence, VarispeedFactory};
use crate::track::{Track, TrackFactory};

/// Streaming options for [`render`]
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub speed: Option<f64>,
    pub reverse: bool,
    pub block: usize,
    pub bit_depth: u16,
}

/// Load `path` if given, otherwise the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Build a track holding one copy of `input` per start time in `at`.
///
/// Clips that would overlap an earlier one are reported and skipped.
pub fn build_track(input: &Path, at: &[f64], config: &EngineConfig) -> Result<Track> {
    let audio = import_wav_at(input, config.project_rate)?;
    let factory = TrackFactory::from_config(config)?;
    let mut track = factory.create(audio.channels())?;
    if let Some(stem) = input.file_stem() {
        track.set_name(stem.to_string_lossy());
    }

    let channels = audio.as_slices();
    for &start in at {
        let mut clip = Clip::from_samples(
            Arc::clone(track.block_factory()),
            track.format(),
            track.rate(),
            start,
            &channels,
        )?;
        clip.set_name(track.new_clip_name());
        match track.insert_clip(clip) {
            Ok(_) => info!("Placed {} at {:.3}s", input.display(), start),
            Err(e @ ClipstreamError::Overlap { .. }) => {
                warn!("Skipping clip at {:.3}s: {}", start, e)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(track)
}

/// Render a track built from `input` to `output`.
pub fn render(
    input: &Path,
    at: &[f64],
    output: &Path,
    options: RenderOptions,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let format = ExportFormat::new(options.bit_depth)?;
    let track = build_track(input, at, &config)?;

    let (t0, t1) = (track.start_time(), track.end_time());
    let mut stream = match options.speed {
        Some(speed) => {
            StretchingSequence::with_transform(&track, Box::new(VarispeedFactory::new(speed)?))
        }
        None => StretchingSequence::new(&track),
    }
    .with_config(&config);

    // Output length in source seconds at the requested speed
    let span = (t1 - t0) / options.speed.unwrap_or(1.0);
    let rendered = if options.reverse {
        render_range_reversed(&mut stream, t1 - span, t1, options.block)?
    } else {
        render_range(&mut stream, t0, t0 + span, options.block)?
    };

    export_wav(&rendered, output, format)?;
    println!(
        "Rendered {} clip(s), {} samples x {} ch to {}",
        track.clip_count(),
        rendered.len(),
        rendered.channels(),
        output.display()
    );
    Ok(())
}

/// Print the tag stream of a track built from `input`, after splitting it.
pub fn layout(input: &Path, at: &[f64], splits: &[f64], config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let mut track = build_track(input, at, &config)?;
    for &t in splits {
        if track.split_at(t)?.is_none() {
            warn!("No clip to split at {:.3}s", t);
        }
    }

    let mut recorder = TagRecorder::new();
    track.write_tags(&mut recorder)?;
    println!("{}", recorder.to_json()?);
    Ok(())
}

/// Print the default configuration.
pub fn default_config() -> Result<()> {
    println!("{}", EngineConfig::default().to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AudioBuffer;
    use tempfile::tempdir;

    fn write_input(dir: &Path, rate: u32) -> std::path::PathBuf {
        let path = dir.join("input.wav");
        let samples = (0..100).map(|i| i as f32 / 100.0).collect();
        let buffer = AudioBuffer::from_channels(vec![samples], rate).unwrap();
        export_wav(&buffer, &path, ExportFormat::float()).unwrap();
        path
    }

    #[test]
    fn test_build_track_skips_overlaps() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path(), 1000);
        let config = EngineConfig {
            project_rate: 1000,
            ..EngineConfig::default()
        };

        let track = build_track(&input, &[0.0, 0.05, 0.5], &config).unwrap();
        assert_eq!(track.clip_count(), 2);
        assert_eq!(track.name(), "input");
        assert!((track.end_time() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_render_writes_track_length() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path(), 1000);
        let config_path = dir.path().join("config.json");
        EngineConfig {
            project_rate: 1000,
            ..EngineConfig::default()
        }
        .save(&config_path)
        .unwrap();
        let output = dir.path().join("out.wav");
        let options = RenderOptions {
            speed: None,
            reverse: true,
            block: 64,
            bit_depth: 32,
        };

        render(&input, &[0.2], &output, options, Some(&config_path)).unwrap();
        let rendered = crate::engine::import_wav(&output).unwrap();
        assert_eq!(rendered.len(), 100);
        assert!((rendered.samples[0][0] - 0.99).abs() < 1e-6);
    }
}
