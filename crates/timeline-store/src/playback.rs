//! Playback transport: play/pause, scrubbing, in/out points, loop, rate,
//! and the seek throttle used while scrubbing.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Current playback mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// The user is dragging the playhead.
    Scrubbing,
}

/// Transport state. Times are global timeline seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub mode: PlaybackMode,
    pub current_time: f64,
    pub in_point: Option<f64>,
    pub out_point: Option<f64>,
    pub loop_enabled: bool,
    /// 1.0 = normal speed.
    pub playback_rate: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            mode: PlaybackMode::Stopped,
            current_time: 0.0,
            in_point: None,
            out_point: None,
            loop_enabled: false,
            playback_rate: 1.0,
        }
    }

    pub fn play(&mut self) {
        self.mode = PlaybackMode::Playing;
        tracing::debug!(time = self.current_time, rate = self.playback_rate, "Playback started");
    }

    pub fn pause(&mut self) {
        self.mode = PlaybackMode::Paused;
        tracing::debug!(time = self.current_time, "Playback paused");
    }

    /// Stop and return to the in-point (or 0).
    pub fn stop(&mut self) {
        self.mode = PlaybackMode::Stopped;
        self.current_time = self.in_point.unwrap_or(0.0);
        tracing::debug!(time = self.current_time, "Playback stopped");
    }

    pub fn toggle_play_pause(&mut self) {
        match self.mode {
            PlaybackMode::Playing => self.pause(),
            PlaybackMode::Paused | PlaybackMode::Stopped | PlaybackMode::Scrubbing => self.play(),
        }
    }

    /// Jump to `time`. A stopped transport becomes paused.
    pub fn seek(&mut self, time: f64) {
        self.current_time = time.max(0.0);
        if self.mode == PlaybackMode::Stopped {
            self.mode = PlaybackMode::Paused;
        }
    }

    pub fn start_scrub(&mut self, time: f64) {
        self.mode = PlaybackMode::Scrubbing;
        self.current_time = time.max(0.0);
    }

    /// Move the playhead; ignored unless scrubbing.
    pub fn scrub_to(&mut self, time: f64) {
        if self.mode == PlaybackMode::Scrubbing {
            self.current_time = time.max(0.0);
        }
    }

    pub fn end_scrub(&mut self) {
        if self.mode == PlaybackMode::Scrubbing {
            self.mode = PlaybackMode::Paused;
            tracing::debug!(time = self.current_time, "Scrub ended");
        }
    }

    pub fn set_in_point(&mut self, time: f64) {
        self.in_point = Some(time.max(0.0));
    }

    pub fn set_out_point(&mut self, time: f64) {
        self.out_point = Some(time.max(0.0));
    }

    pub fn clear_in_out(&mut self) {
        self.in_point = None;
        self.out_point = None;
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Clamped to [0.1, 16.0].
    pub fn set_rate(&mut self, rate: f64) {
        self.playback_rate = rate.clamp(0.1, 16.0);
    }

    /// (start, end) of the playable range: in/out points, else the whole
    /// timeline.
    pub fn playback_range(&self, duration: f64) -> (f64, f64) {
        let start = self.in_point.unwrap_or(0.0);
        let end = self.out_point.unwrap_or(duration).max(start);
        (start, end)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.mode, PlaybackMode::Playing | PlaybackMode::Scrubbing)
    }

    pub fn is_at_end(&self, duration: f64) -> bool {
        let (_, end) = self.playback_range(duration);
        self.current_time >= end
    }

    /// Timer tick: advance the playhead by `dt` wall-clock seconds. At the
    /// end of the range playback wraps when looping and stops at the end
    /// otherwise. Returns the new playhead.
    pub fn advance(&mut self, dt: f64, duration: f64) -> f64 {
        if self.mode != PlaybackMode::Playing {
            return self.current_time;
        }
        let (start, end) = self.playback_range(duration);
        let next = self.current_time + dt.max(0.0) * self.playback_rate;
        if next < end {
            self.current_time = next;
        } else if self.loop_enabled && end > start {
            self.current_time = start + (next - end) % (end - start);
        } else {
            self.current_time = end;
            self.mode = PlaybackMode::Paused;
            tracing::debug!(time = end, "Playback reached end");
        }
        self.current_time
    }
}

/// Coalesces media seeks while scrubbing: a seek is let through only once
/// the previous one has had `interval` to settle; the latest rejected target
/// is kept so it can be flushed when scrubbing ends.
#[derive(Clone, Debug)]
pub struct SeekThrottle {
    interval: Duration,
    last_seek: Option<Instant>,
    pending: Option<f64>,
}

impl SeekThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seek: None,
            pending: None,
        }
    }

    /// Whether a seek to `time` should go to the decoder now. Seeks outside
    /// scrubbing always pass.
    pub fn request(&mut self, time: f64, scrubbing: bool, now: Instant) -> bool {
        let settled = self
            .last_seek
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if !scrubbing || settled {
            self.last_seek = Some(now);
            self.pending = None;
            true
        } else {
            self.pending = Some(time);
            false
        }
    }

    /// The last seek that was held back, if any; clears it.
    pub fn take_pending(&mut self) -> Option<f64> {
        self.pending.take()
    }
}
