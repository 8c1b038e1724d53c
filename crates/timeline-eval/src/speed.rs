//! Playback speed and time remapping.
//!
//! A clip's timeline duration is its source span stretched by `1 / |speed|`.
//! With speed keyframes, the source offset at a clip-local time is the
//! integral of `|speed(t)|` from the clip start.

use crate::keyframe::interpolate;
use crate::types::{AnimatableProperty, Keyframe};

/// Speed magnitudes below this are treated as this value.
pub const MIN_SPEED: f64 = 0.01;

/// Integration step for keyframed speed, in seconds.
pub const INTEGRATION_STEP: f64 = 1.0 / 240.0;

/// Magnitude of `speed`, floored at [`MIN_SPEED`].
pub fn effective_speed(speed: f64) -> f64 {
    let magnitude = speed.abs();
    if magnitude.is_nan() || magnitude < MIN_SPEED {
        MIN_SPEED
    } else {
        magnitude
    }
}

/// Timeline duration of a source span played at `speed`.
pub fn timeline_duration(source_span: f64, speed: f64) -> f64 {
    source_span.max(0.0) / effective_speed(speed)
}

/// Source seconds consumed after `local_time` seconds of playback.
///
/// `keyframes` may be the clip's full keyframe list; only `speed` keyframes
/// are used. Without any, this is `local_time * |speed|`.
pub fn source_offset(local_time: f64, speed: f64, keyframes: &[Keyframe]) -> f64 {
    let local_time = local_time.max(0.0);
    let speed_kfs: Vec<&Keyframe> = keyframes
        .iter()
        .filter(|kf| kf.property == AnimatableProperty::Speed)
        .collect();

    if speed_kfs.is_empty() {
        return local_time * effective_speed(speed);
    }

    let speed_at = |t: f64| {
        effective_speed(interpolate(speed_kfs.iter().copied(), t).unwrap_or(speed))
    };

    // Speed holds after the last keyframe, so only the keyframed span needs
    // the trapezoid rule; the final step is partial.
    let last_kf = speed_kfs.iter().map(|kf| kf.time).fold(0.0_f64, f64::max);
    let ramp_end = local_time.min(last_kf);
    let mut offset = 0.0;
    let mut t = 0.0;
    let mut prev = speed_at(0.0);
    while t < ramp_end {
        let next_t = (t + INTEGRATION_STEP).min(ramp_end);
        let next = speed_at(next_t);
        offset += (prev + next) * 0.5 * (next_t - t);
        prev = next;
        t = next_t;
    }
    if local_time > ramp_end {
        offset += (local_time - ramp_end) * speed_at(ramp_end);
    }
    offset
}

/// Map a source offset into the clip's `[in_point, out_point]` range.
/// Reversed clips read backwards from the out-point.
pub fn source_time(in_point: f64, out_point: f64, reversed: bool, offset: f64) -> f64 {
    let t = if reversed {
        out_point - offset
    } else {
        in_point + offset
    };
    t.clamp(in_point.min(out_point), out_point.max(in_point))
}
