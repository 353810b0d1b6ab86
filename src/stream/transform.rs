//! Pluggable transform stages
//!
//! A [`TransformStage`] is a block processor sitting between the segment
//! walk and the caller. It may hold samples back across calls and return
//! fewer samples than it consumed; whatever it still holds comes out of
//! [`TransformStage::flush`] once the input ends. Stages are driven with one
//! monotonic, direction-consistent stream and are discarded on every seek.

use crate::error::{ClipstreamError, Result};
use crate::segment::ClipSpan;

/// Block processor contract
pub trait TransformStage: Send {
    /// Consume one chunk per channel and append any ready output to `output`
    ///
    /// All input slices have the same length; `output` has one vector per
    /// channel and every call appends the same count to each.
    fn process(&mut self, input: &[&[f32]], output: &mut [Vec<f32>]) -> Result<()>;

    /// Append everything still held back; called once after the last input
    fn flush(&mut self, output: &mut [Vec<f32>]) -> Result<()>;

    /// Forget all buffered state
    fn reset(&mut self);

    /// Samples held back in steady state
    fn latency(&self) -> usize {
        0
    }
}

/// Builds a fresh stage for each segment walk
pub trait TransformFactory {
    /// # Arguments
    /// * `rate` - Sample rate of the source sequence
    /// * `n_channels` - Channels every call will carry
    /// * `spans` - The source's clips in time order
    fn create(
        &self,
        rate: u32,
        n_channels: usize,
        spans: &[ClipSpan],
    ) -> Result<Box<dyn TransformStage>>;
}

// ============================================================================
// Varispeed
// ============================================================================

/// Tape-style speed change by linear interpolation
///
/// Pitch follows speed. Output sample `k` is the input read at position
/// `k * speed`. One input sample is held back to interpolate against.
#[derive(Debug, Clone)]
pub struct Varispeed {
    speed: f64,
    history: Vec<Vec<f32>>,
    phase: f64,
}

impl Varispeed {
    /// # Errors
    /// `InvalidParameter` unless `speed` is finite and positive
    pub fn new(speed: f64, n_channels: usize) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "speed".to_string(),
                value: speed.to_string(),
            });
        }
        Ok(Self {
            speed,
            history: vec![Vec::new(); n_channels],
            phase: 0.0,
        })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn held(&self) -> usize {
        self.history.first().map_or(0, Vec::len)
    }

    /// Emit every output sample whose position is below `limit`
    fn emit(&mut self, output: &mut [Vec<f32>], limit: f64) {
        let len = self.held();
        while self.phase < limit {
            let index = self.phase.floor() as usize;
            let frac = (self.phase - index as f64) as f32;
            for (history, out) in self.history.iter().zip(output.iter_mut()) {
                let sample = match history.get(index + 1) {
                    Some(&next) => history[index] * (1.0 - frac) + next * frac,
                    None => history[index],
                };
                out.push(sample);
            }
            self.phase += self.speed;
            if index + 1 >= len {
                break;
            }
        }
    }
}

impl TransformStage for Varispeed {
    fn process(&mut self, input: &[&[f32]], output: &mut [Vec<f32>]) -> Result<()> {
        for (history, data) in self.history.iter_mut().zip(input) {
            history.extend_from_slice(data);
        }
        let len = self.held();
        if len < 2 {
            return Ok(());
        }
        self.emit(output, (len - 1) as f64);

        let consumed = (self.phase.floor() as usize).min(len);
        for history in &mut self.history {
            history.drain(..consumed);
        }
        self.phase -= consumed as f64;
        Ok(())
    }

    fn flush(&mut self, output: &mut [Vec<f32>]) -> Result<()> {
        let len = self.held();
        if len > 0 {
            self.emit(output, len as f64);
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        for history in &mut self.history {
            history.clear();
        }
        self.phase = 0.0;
    }

    fn latency(&self) -> usize {
        1
    }
}

/// Creates a [`Varispeed`] stage per segment walk
#[derive(Debug, Clone, Copy)]
pub struct VarispeedFactory {
    speed: f64,
}

impl VarispeedFactory {
    pub fn new(speed: f64) -> Result<Self> {
        Varispeed::new(speed, 0)?;
        Ok(Self { speed })
    }
}

impl TransformFactory for VarispeedFactory {
    fn create(
        &self,
        _rate: u32,
        n_channels: usize,
        _spans: &[ClipSpan],
    ) -> Result<Box<dyn TransformStage>> {
        Ok(Box::new(Varispeed::new(self.speed, n_channels)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(stage: &mut dyn TransformStage, input: &[f32], chunk: usize) -> Vec<f32> {
        let mut out: Vec<Vec<f32>> = vec![Vec::new()];
        for part in input.chunks(chunk) {
            stage.process(&[part], &mut out).unwrap();
        }
        stage.flush(&mut out).unwrap();
        out.remove(0)
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_double_speed_skips_every_other_sample() {
        let mut stage = Varispeed::new(2.0, 1).unwrap();
        assert_eq!(run(&mut stage, &ramp(8), 8), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_unit_speed_is_identity_regardless_of_chunking() {
        for chunk in [1, 3, 8] {
            let mut stage = Varispeed::new(1.0, 1).unwrap();
            assert_eq!(run(&mut stage, &ramp(8), chunk), ramp(8));
        }
    }

    #[test]
    fn test_half_speed_interpolates() {
        let mut stage = Varispeed::new(0.5, 1).unwrap();
        let out = run(&mut stage, &[0.0, 1.0, 2.0], 3);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_unit_speed_holds_one_sample() {
        let mut stage = Varispeed::new(1.0, 1).unwrap();
        let mut out: Vec<Vec<f32>> = vec![Vec::new()];
        stage.process(&[&[1.0, 2.0, 3.0]], &mut out).unwrap();
        assert_eq!(out[0], vec![1.0, 2.0]);
        assert_eq!(stage.latency(), 1);
    }

    #[test]
    fn test_reset_discards_history() {
        let mut stage = Varispeed::new(1.0, 1).unwrap();
        let mut out: Vec<Vec<f32>> = vec![Vec::new()];
        stage.process(&[&[1.0, 2.0]], &mut out).unwrap();
        stage.reset();
        stage.flush(&mut out).unwrap();
        assert_eq!(out[0], vec![1.0]);
    }

    #[test]
    fn test_rejects_bad_speed() {
        assert!(Varispeed::new(0.0, 1).is_err());
        assert!(VarispeedFactory::new(f64::NAN).is_err());
        assert!(VarispeedFactory::new(1.5).is_ok());
    }
}
