//! Gain-over-time curve attached to a clip
//!
//! Control points are stored relative to the clip start so that moving a
//! clip never touches its envelope.

use serde::{Deserialize, Serialize};

/// Default lower gain bound
pub const ENVELOPE_MIN: f64 = 1.0e-7;

/// Default upper gain bound
pub const ENVELOPE_MAX: f64 = 2.0;

/// A single control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvPoint {
    /// Seconds from the clip start
    pub t: f64,
    /// Gain at `t`
    pub value: f64,
}

/// Piecewise-linear gain curve
///
/// Before the first point and after the last the curve is flat. With no
/// points the curve is the default value everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    points: Vec<EnvPoint>,
    default_value: f64,
    min: f64,
    max: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(ENVELOPE_MIN, ENVELOPE_MAX, 1.0)
    }
}

impl Envelope {
    /// Create an envelope with no points
    pub fn new(min: f64, max: f64, default_value: f64) -> Self {
        Self {
            points: Vec::new(),
            default_value: default_value.clamp(min, max),
            min,
            max,
        }
    }

    /// Control points in time order
    pub fn points(&self) -> &[EnvPoint] {
        &self.points
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// True when the curve is exactly 1.0 everywhere
    pub fn is_trivial(&self) -> bool {
        if self.points.is_empty() {
            self.default_value == 1.0
        } else {
            self.points.iter().all(|p| p.value == 1.0)
        }
    }

    /// Insert or replace the point at `t`, clamping its value to the range
    pub fn insert_point(&mut self, t: f64, value: f64) {
        let value = value.clamp(self.min, self.max);
        let index = self.points.partition_point(|p| p.t < t);
        match self.points.get_mut(index) {
            Some(existing) if existing.t == t => existing.value = value,
            _ => self.points.insert(index, EnvPoint { t, value }),
        }
    }

    /// Remove every control point
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Gain at `t` seconds from the clip start
    pub fn value_at(&self, t: f64) -> f64 {
        // First point strictly after t; coincident points resolve to the later one
        let index = self.points.partition_point(|p| p.t <= t);
        match (index, self.points.len()) {
            (_, 0) => self.default_value,
            (0, _) => self.points[0].value,
            (i, n) if i == n => self.points[n - 1].value,
            (i, _) => {
                let a = self.points[i - 1];
                let b = self.points[i];
                let span = b.t - a.t;
                if span <= 0.0 {
                    b.value
                } else {
                    a.value + (b.value - a.value) * (t - a.t) / span
                }
            }
        }
    }

    /// Fill `buffer` with values at `t0`, `t0 + dt`, ...
    pub fn values(&self, buffer: &mut [f64], t0: f64, dt: f64) {
        for (i, out) in buffer.iter_mut().enumerate() {
            *out = self.value_at(t0 + i as f64 * dt);
        }
    }

    /// Split at `at`, keeping the curve on `[0, at]` and returning the rest
    /// rebased to start at zero
    ///
    /// Boundary points are added on both sides so neither half changes shape.
    pub fn split_off(&mut self, at: f64) -> Envelope {
        let mut right = Envelope::new(self.min, self.max, self.default_value);
        if self.points.is_empty() {
            return right;
        }

        let boundary = self.value_at(at);
        let index = self.points.partition_point(|p| p.t <= at);
        right.points.push(EnvPoint {
            t: 0.0,
            value: boundary,
        });
        right.points.extend(
            self.points[index..]
                .iter()
                .filter(|p| p.t > at)
                .map(|p| EnvPoint {
                    t: p.t - at,
                    value: p.value,
                }),
        );

        self.points.truncate(index);
        if self.points.last().map_or(true, |p| p.t < at) {
            self.points.push(EnvPoint {
                t: at,
                value: boundary,
            });
        }
        right
    }

    /// Append `other`, whose time zero lands at `offset` in this envelope
    pub fn append(&mut self, other: &Envelope, offset: f64) {
        if self.is_trivial() && other.is_trivial() {
            return;
        }
        if self.points.is_empty() {
            self.points.push(EnvPoint {
                t: 0.0,
                value: self.default_value,
            });
        }
        let end = self.value_at(offset);
        if self.points.last().map_or(true, |p| p.t < offset) {
            self.points.push(EnvPoint { t: offset, value: end });
        }
        if other.points.is_empty() {
            self.points.push(EnvPoint {
                t: offset,
                value: other.default_value,
            });
        } else {
            self.points.extend(other.points.iter().map(|p| EnvPoint {
                t: p.t + offset,
                value: p.value,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_trivial() {
        let env = Envelope::default();
        assert!(env.is_trivial());
        assert_eq!(env.value_at(12.5), 1.0);
    }

    #[test]
    fn test_linear_interpolation() {
        let mut env = Envelope::new(0.0, 2.0, 1.0);
        env.insert_point(0.0, 0.0);
        env.insert_point(2.0, 1.0);
        assert!(!env.is_trivial());
        assert_relative_eq!(env.value_at(1.0), 0.5);
        assert_relative_eq!(env.value_at(-1.0), 0.0);
        assert_relative_eq!(env.value_at(5.0), 1.0);
    }

    #[test]
    fn test_insert_replaces_and_clamps() {
        let mut env = Envelope::default();
        env.insert_point(1.0, 0.5);
        env.insert_point(1.0, 9.0);
        assert_eq!(env.points().len(), 1);
        assert_eq!(env.points()[0].value, ENVELOPE_MAX);
    }

    #[test]
    fn test_split_preserves_shape() {
        let mut env = Envelope::new(0.0, 2.0, 1.0);
        env.insert_point(0.0, 0.0);
        env.insert_point(4.0, 1.0);
        let original = env.clone();

        let right = env.split_off(1.0);
        assert_relative_eq!(env.value_at(0.5), original.value_at(0.5), epsilon = 1e-12);
        assert_relative_eq!(env.value_at(1.0), original.value_at(1.0), epsilon = 1e-12);
        assert_relative_eq!(right.value_at(0.0), original.value_at(1.0), epsilon = 1e-12);
        assert_relative_eq!(right.value_at(2.0), original.value_at(3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_split_trivial_stays_trivial() {
        let mut env = Envelope::default();
        let right = env.split_off(3.0);
        assert!(env.is_trivial());
        assert!(right.is_trivial());
    }

    #[test]
    fn test_append_offsets_points() {
        let mut left = Envelope::default();
        left.insert_point(0.0, 0.5);
        let mut right = Envelope::default();
        right.insert_point(1.0, 0.25);

        left.append(&right, 2.0);
        assert_relative_eq!(left.value_at(1.0), 0.5);
        assert_relative_eq!(left.value_at(3.0), 0.25);
    }

    #[test]
    fn test_values_fill() {
        let mut env = Envelope::new(0.0, 2.0, 1.0);
        env.insert_point(0.0, 0.0);
        env.insert_point(1.0, 1.0);
        let mut buf = [0.0; 3];
        env.values(&mut buf, 0.0, 0.5);
        assert_eq!(buf, [0.0, 0.5, 1.0]);
    }
}
