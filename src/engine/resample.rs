//! Sample rate conversion

/// Linear interpolation resampling
///
/// Produces `ceil(len * ratio)` samples, where `ratio` is target rate over
/// source rate. No anti-alias filter is applied, so content above the
/// target Nyquist frequency folds back when downsampling.
pub fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() || !ratio.is_finite() || ratio <= 0.0 {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

/// Resample each channel from `source_rate` to `target_rate`
pub fn resample_channels(
    channels: &[Vec<f32>],
    source_rate: u32,
    target_rate: u32,
) -> Vec<Vec<f32>> {
    if source_rate == target_rate || source_rate == 0 {
        return channels.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    channels
        .iter()
        .map(|channel| resample_linear(channel, ratio))
        .collect()
}
