//! Structural edits on a track's clip set
//!
//! Every edit either commits completely or leaves the track untouched.
//! Multi-step edits run against a cloned arena that replaces the track's
//! only after every fallible step has succeeded.

use log::debug;

use super::{sorted, unused_name, ClipArena, ClipHandle, Track};
use crate::clip::Clip;
use crate::error::{ClipstreamError, Result};
use crate::sequence::samples_to_time;

/// Overlap below this is floating point noise, not a collision
const TIME_EPSILON: f64 = 1.0e-9;

/// Length of the intersection of two intervals, negative when disjoint
fn overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.1.min(b.1) - a.0.max(b.0)
}

fn bounds(clip: &Clip) -> (f64, f64) {
    (clip.start_time(), clip.end_time())
}

fn check_range(t0: f64, t1: f64) -> Result<()> {
    if !t0.is_finite() || !t1.is_finite() || t0 > t1 {
        return Err(ClipstreamError::InvalidTimeRange { t0, t1 });
    }
    Ok(())
}

/// Split the clip strictly containing `t`, naming the right half as a copy
fn split_in(clips: &mut ClipArena<Clip>, t: f64) -> Result<Option<ClipHandle>> {
    let target = clips.iter().find(|(_, c)| {
        let s = c.local_index(t);
        s > 0 && (s as u64) < c.num_samples()
    });
    let Some((handle, clip)) = target else {
        return Ok(None);
    };

    let mut left = clip.clone();
    let mut right = left.split_at(t)?;
    right.set_name(unused_name(clips, left.name()));
    clips.replace(handle, left);
    Ok(Some(clips.insert(right)))
}

impl Track {
    fn check_compatible(&self, clip: &Clip) -> Result<()> {
        if clip.n_channels() != self.n_channels || clip.rate() != self.rate {
            return Err(ClipstreamError::IncompatibleFormat {
                details: format!(
                    "clip is {} ch @ {} Hz, track is {} ch @ {} Hz",
                    clip.n_channels(),
                    clip.rate(),
                    self.n_channels,
                    self.rate
                ),
            });
        }
        Ok(())
    }

    /// First non-empty clip outside `skip` overlapping `span` by more than
    /// `tolerance`
    fn find_overlap(
        &self,
        span: (f64, f64),
        tolerance: f64,
        skip: &[ClipHandle],
    ) -> Option<&Clip> {
        if span.1 <= span.0 {
            return None;
        }
        self.clips
            .iter()
            .filter(|(h, c)| !c.is_empty() && !skip.contains(h))
            .map(|(_, c)| c)
            .find(|c| overlap(bounds(c), span) > tolerance)
    }

    /// `Overlap` if `clip`, replacing the clips in `replaced`, would collide
    /// with any other clip
    fn check_fits(&self, clip: &Clip, replaced: &[ClipHandle]) -> Result<()> {
        let span = bounds(clip);
        match self.find_overlap(span, self.merge_tolerance, replaced) {
            Some(other) => {
                debug!(
                    "Rejected clip [{:.6}, {:.6}): overlaps '{}'",
                    span.0,
                    span.1,
                    other.name()
                );
                Err(ClipstreamError::Overlap {
                    start: span.0,
                    end: span.1,
                    other_start: other.start_time(),
                    other_end: other.end_time(),
                })
            }
            None => Ok(()),
        }
    }

    /// Add a clip to the track
    ///
    /// # Errors
    /// `IncompatibleFormat` if the channel count or rate differs from the
    /// track's; `Overlap` if the clip intersects an existing clip by more
    /// than the merge tolerance.
    pub fn insert_clip(&mut self, clip: Clip) -> Result<ClipHandle> {
        self.check_compatible(&clip)?;
        self.check_fits(&clip, &[])?;
        debug!("Inserted clip '{}' at {:.6}", clip.name(), clip.start_time());
        Ok(self.clips.insert(clip))
    }

    /// Detach a clip; the caller becomes its sole owner
    pub fn remove_clip(&mut self, handle: ClipHandle) -> Result<Clip> {
        let clip = self
            .clips
            .remove(handle)
            .ok_or(ClipstreamError::StaleHandle { handle })?;
        debug!("Removed clip '{}'", clip.name());
        Ok(clip)
    }

    /// Split the clip containing `t` into two clips at the sample nearest `t`
    ///
    /// The left half keeps its handle. Returns the right half's handle, or
    /// `None` when no clip has samples on both sides of `t`.
    pub fn split_at(&mut self, t: f64) -> Result<Option<ClipHandle>> {
        let right = split_in(&mut self.clips, t)?;
        if right.is_some() {
            debug!("Split clip at {:.6}", t);
        }
        Ok(right)
    }

    /// Split at both ends of `[t0, t1]`
    pub fn split(&mut self, t0: f64, t1: f64) -> Result<()> {
        check_range(t0, t1)?;
        let mut clips = self.clips.clone();
        split_in(&mut clips, t0)?;
        split_in(&mut clips, t1)?;
        self.clips = clips;
        Ok(())
    }

    /// Concatenate two clips that touch within the merge tolerance
    ///
    /// Whichever starts first keeps its handle and receives the other's
    /// samples; the other handle becomes stale.
    ///
    /// # Errors
    /// `NotAdjacent` if the gap or overlap between them exceeds the
    /// tolerance; `IncompatibleFormat` if their rates differ; `Overlap` if
    /// the merged clip would reach into a third clip.
    pub fn merge_clips(&mut self, a: ClipHandle, b: ClipHandle) -> Result<ClipHandle> {
        if a == b {
            return Err(ClipstreamError::InvalidParameter {
                param: "clips".to_string(),
                value: "cannot merge a clip with itself".to_string(),
            });
        }
        let clip_a = self.clip(a)?;
        let clip_b = self.clip(b)?;
        let ((left_handle, left), (right_handle, right)) =
            if clip_a.start_time() <= clip_b.start_time() {
                ((a, clip_a), (b, clip_b))
            } else {
                ((b, clip_b), (a, clip_a))
            };

        let gap = right.start_time() - left.end_time();
        if gap.abs() > self.merge_tolerance {
            debug!("Rejected merge: gap of {:.6}s", gap);
            return Err(ClipstreamError::NotAdjacent { gap });
        }

        let mut merged = left.clone();
        merged.append_clip(right)?;
        self.check_fits(&merged, &[left_handle, right_handle])?;
        self.clips.replace(left_handle, merged);
        self.clips.remove(right_handle);
        debug!("Merged clips across gap of {:.6}s", gap);
        Ok(left_handle)
    }

    /// Merge every clip intersecting `[t0, t1]` into the first of them
    ///
    /// Gaps between clips become silence, rounded to whole samples. Returns
    /// the surviving clip.
    ///
    /// # Errors
    /// `Overlap` if that rounding would push the joined clip into a clip
    /// outside the range; the track is left unchanged.
    pub fn join(&mut self, t0: f64, t1: f64) -> Result<Option<ClipHandle>> {
        check_range(t0, t1)?;
        let targets: Vec<(ClipHandle, &Clip)> = self
            .sorted_clips()
            .into_iter()
            .filter(|(_, c)| !c.is_empty() && c.start_time() < t1 && c.end_time() > t0)
            .collect();
        let Some(&(first_handle, first)) = targets.first() else {
            return Ok(None);
        };

        let mut merged = first.clone();
        for (_, clip) in &targets[1..] {
            let gap = clip.start_sample() - merged.end_sample();
            let mut next = (*clip).clone();
            if gap > 0 {
                merged.append_silence(gap as usize)?;
            } else if gap < 0 {
                next.clear_left(samples_to_time(merged.end_sample(), self.rate))?;
            }
            merged.append_clip(&next)?;
        }

        let absorbed: Vec<ClipHandle> = targets[1..].iter().map(|(h, _)| *h).collect();
        let replaced: Vec<ClipHandle> = targets.iter().map(|(h, _)| *h).collect();
        self.check_fits(&merged, &replaced)?;
        self.clips.replace(first_handle, merged);
        for handle in &absorbed {
            self.clips.remove(*handle);
        }
        debug!("Joined {} clips in [{:.6}, {:.6}]", absorbed.len() + 1, t0, t1);
        Ok(Some(first_handle))
    }

    /// Remove all audio outside `[t0, t1)`
    pub fn trim(&mut self, t0: f64, t1: f64) -> Result<()> {
        check_range(t0, t1)?;
        let mut clips = self.clips.clone();
        for handle in clips.handles() {
            let Some(clip) = clips.get_mut(handle) else {
                continue;
            };
            if clip.end_time() <= t0 || clip.start_time() >= t1 {
                clips.remove(handle);
                continue;
            }
            clip.clear_left(t0)?;
            clip.clear_right(t1)?;
            if clip.is_empty() {
                clips.remove(handle);
            }
        }
        self.clips = clips;
        debug!("Trimmed track to [{:.6}, {:.6})", t0, t1);
        Ok(())
    }

    /// Largest shift no further than `amount` (same sign) that moves
    /// `handles` without colliding with any other clip, plus the pair of
    /// clips that limits it
    fn offset_limit(
        &self,
        handles: &[ClipHandle],
        amount: f64,
    ) -> Result<(f64, Option<(ClipHandle, ClipHandle)>)> {
        let moving = handles
            .iter()
            .map(|&h| self.clip(h).map(|c| (h, c)))
            .collect::<Result<Vec<_>>>()?;

        let mut allowed = amount;
        let mut blocker = None;
        for (fixed_handle, fixed) in self.clips.iter() {
            if fixed.is_empty() || handles.contains(&fixed_handle) {
                continue;
            }
            for &(moving_handle, clip) in &moving {
                if clip.is_empty() {
                    continue;
                }
                // Only clips ahead in the direction of travel can block
                let limit = if amount > 0.0 && fixed.start_time() >= clip.start_time() {
                    (fixed.start_time() - clip.end_time()).max(0.0)
                } else if amount < 0.0 && fixed.end_time() <= clip.end_time() {
                    (fixed.end_time() - clip.start_time()).min(0.0)
                } else {
                    continue;
                };
                if limit.abs() < allowed.abs() {
                    allowed = limit;
                    blocker = Some((moving_handle, fixed_handle));
                }
            }
        }
        Ok((allowed, blocker))
    }

    /// Largest same-signed shift up to `amount` that creates no overlap
    ///
    /// Clips in `handles` move together; every other clip stays put. Every
    /// magnitude between zero and the returned value is also allowed.
    pub fn max_offset(&self, handles: &[ClipHandle], amount: f64) -> Result<f64> {
        Ok(self.offset_limit(handles, amount)?.0)
    }

    /// True if shifting `handles` by `amount` creates no overlap
    pub fn can_offset(&self, handles: &[ClipHandle], amount: f64) -> Result<bool> {
        Ok(self.max_offset(handles, amount)? == amount)
    }

    /// Shift clips along the timeline
    ///
    /// # Errors
    /// `Overlap` naming the first blocking clip if the full shift is not
    /// possible; the track is left unchanged.
    pub fn offset_clips(&mut self, handles: &[ClipHandle], amount: f64) -> Result<()> {
        if !amount.is_finite() {
            return Err(ClipstreamError::InvalidParameter {
                param: "amount".to_string(),
                value: amount.to_string(),
            });
        }
        let (allowed, blocker) = self.offset_limit(handles, amount)?;
        if allowed != amount {
            if let Some((moving, fixed)) = blocker {
                let (start, end) = bounds(self.clip(moving)?);
                let (other_start, other_end) = bounds(self.clip(fixed)?);
                debug!("Rejected offset of {:.6}s: blocked at {:.6}", amount, allowed);
                return Err(ClipstreamError::Overlap {
                    start: start + amount,
                    end: end + amount,
                    other_start,
                    other_end,
                });
            }
        }

        let mut unique = handles.to_vec();
        unique.sort();
        unique.dedup();
        for handle in unique {
            if let Some(clip) = self.clips.get_mut(handle) {
                clip.offset(amount);
            }
        }
        debug!("Offset {} clips by {:.6}s", handles.len(), amount);
        Ok(())
    }

    /// Shift that lets `clip` be inserted without overlap, if one exists
    /// within the merge tolerance
    ///
    /// Returns `Some(0.0)` when the clip already fits and `None` when it
    /// cannot be made to fit or does not match the track's format.
    pub fn can_insert_clip(&self, clip: &Clip) -> Option<f64> {
        if self.check_compatible(clip).is_err() {
            return None;
        }
        if clip.is_empty() {
            return Some(0.0);
        }

        let (start, end) = bounds(clip);
        let mut candidates = vec![0.0];
        for (_, other) in sorted(&self.clips) {
            if other.is_empty() || overlap(bounds(other), (start, end)) <= TIME_EPSILON {
                continue;
            }
            candidates.push(other.end_time() - start);
            candidates.push(other.start_time() - end);
        }
        candidates.retain(|slide: &f64| slide.abs() <= self.merge_tolerance);
        candidates.sort_by(|a, b| a.abs().total_cmp(&b.abs()));
        candidates
            .into_iter()
            .find(|slide| {
                self.find_overlap((start + slide, end + slide), TIME_EPSILON, &[])
                    .is_none()
            })
    }
}
