//! RAM preview bookkeeping: which frames are cached, and the frame schedule
//! of a preview render.
//!
//! The store never renders. A caller drives a [`RamPreviewJob`] by pulling
//! frame times from it, rendering each through the query API, and reporting
//! back with `mark_frame_cached`. Any committed edit clears the cached ranges
//! and cancels the running job.

use ms_common::Rational;

use crate::cancel::CancelToken;

const RANGE_EPSILON: f64 = 1e-9;

/// Merged, frame-aligned time ranges whose frames are in the preview cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedRanges {
    fps: Rational,
    /// Sorted, non-overlapping `[start, end)` spans.
    ranges: Vec<(f64, f64)>,
}

impl CachedRanges {
    pub fn new(fps: Rational) -> Self {
        Self {
            fps,
            ranges: Vec::new(),
        }
    }

    pub fn fps(&self) -> Rational {
        self.fps
    }

    pub fn ranges(&self) -> &[(f64, f64)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Mark the frame containing `time` as cached.
    pub fn add_frame(&mut self, time: f64) {
        let start = self.fps.quantize(time.max(0.0));
        self.insert(start, start + self.fps.frame_duration());
    }

    /// Mark every frame touched by `[start, end)` as cached.
    pub fn add_range(&mut self, start: f64, end: f64) {
        if end <= start {
            return;
        }
        let first = self.fps.quantize(start.max(0.0));
        let mut last = self.fps.quantize(end);
        if last < end - RANGE_EPSILON {
            last += self.fps.frame_duration();
        }
        self.insert(first, last);
    }

    pub fn contains(&self, time: f64) -> bool {
        self.ranges
            .iter()
            .any(|&(start, end)| time >= start - RANGE_EPSILON && time < end - RANGE_EPSILON)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Total cached seconds.
    pub fn cached_seconds(&self) -> f64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    fn insert(&mut self, start: f64, end: f64) {
        self.ranges.push((start, end));
        self.ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 + RANGE_EPSILON => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }
}

/// The frame schedule of one RAM preview pass over `[start, end)`.
///
/// Iterating yields frame times in order. Cancellation is checked before
/// every frame, so a cancelled job stops yielding immediately.
#[derive(Debug)]
pub struct RamPreviewJob {
    times: Vec<f64>,
    next: usize,
    cancel: CancelToken,
}

impl RamPreviewJob {
    pub fn new(start: f64, end: f64, fps: Rational, cancel: CancelToken) -> Self {
        let frame = fps.frame_duration();
        let first = fps.quantize(start.max(0.0));
        let mut times = Vec::new();
        let mut index = 0_u64;
        loop {
            let t = first + index as f64 * frame;
            if t >= end - RANGE_EPSILON {
                break;
            }
            times.push(t);
            index += 1;
        }
        tracing::debug!(start, end, frames = times.len(), "RAM preview scheduled");
        Self {
            times,
            next: 0,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn total_frames(&self) -> usize {
        self.times.len()
    }

    /// Frames handed out so far.
    pub fn frames_started(&self) -> usize {
        self.next
    }

    pub fn progress(&self) -> f64 {
        if self.times.is_empty() {
            return 1.0;
        }
        self.next as f64 / self.times.len() as f64
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.times.len()
    }
}

impl Iterator for RamPreviewJob {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let time = self.times.get(self.next).copied()?;
        self.next += 1;
        Some(time)
    }
}
