//! Placement math: snapping, overlap resistance, free-slot search, and
//! trimming of clips covered by a drop.
//!
//! Everything here except [`trim_overlapping_clips`] is a pure query over
//! the state; calling it twice with the same inputs gives the same answer.

use tracing::trace;

use ms_common::TimelineConfig;
use ms_timeline_eval::effective_speed;

use crate::clips::remove_clip;
use crate::error::TimelineResult;
use crate::state::TimelineState;
use crate::transitions::detach_transition;
use crate::types::{Clip, TIME_EPSILON};

/// Outcome of snapping a drag position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SnapResult {
    pub start_time: f64,
    pub snapped: bool,
    /// The edge the clip snapped to, in timeline seconds.
    pub snap_target: Option<f64>,
}

/// Outcome of resolving a drop position against existing clips.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlacementResult {
    pub start_time: f64,
    /// The clip was placed over other clips on purpose; the caller trims them.
    pub forcing_overlap: bool,
    /// No collision-free slot exists on the target track.
    pub no_free_space: bool,
}

impl PlacementResult {
    fn free(start_time: f64) -> Self {
        Self {
            start_time,
            forcing_overlap: false,
            no_free_space: false,
        }
    }

    fn overlapping(start_time: f64) -> Self {
        Self {
            start_time,
            forcing_overlap: true,
            no_free_space: false,
        }
    }
}

/// Snap `desired` to a neighbouring clip edge or to 0.
///
/// Candidates move either edge of the dragged clip onto either edge of each
/// other clip on `track_id` (the clip itself and its linked partner
/// excluded), plus its start onto 0. The closest candidate within
/// `snap_threshold` wins.
pub fn get_snapped_position(
    state: &TimelineState,
    config: &TimelineConfig,
    clip_id: &str,
    desired: f64,
    track_id: &str,
) -> TimelineResult<SnapResult> {
    let clip = state.require_clip(clip_id)?;
    let unsnapped = SnapResult {
        start_time: desired.max(0.0),
        snapped: false,
        snap_target: None,
    };
    if !config.snapping_enabled {
        return Ok(unsnapped);
    }

    let duration = clip.duration;
    let partner = clip.linked_clip_id.as_deref();
    let mut candidates: Vec<(f64, f64)> = vec![(0.0, 0.0)];
    for other in state.clips_on_track(track_id) {
        if other.id == clip_id || Some(other.id.as_str()) == partner {
            continue;
        }
        let (s, e) = (other.start_time, other.end_time());
        candidates.push((s, s));
        candidates.push((e, e));
        candidates.push((s - duration, s));
        candidates.push((e - duration, e));
    }

    let best = candidates
        .into_iter()
        .filter(|(start, _)| *start >= 0.0)
        .map(|(start, target)| ((start - desired).abs(), start, target))
        .filter(|(distance, _, _)| *distance <= config.snap_threshold)
        .min_by(|a, b| a.0.total_cmp(&b.0));

    Ok(match best {
        Some((_, start, target)) => {
            trace!(clip_id, desired, snapped = start, "Snapped");
            SnapResult {
                start_time: start,
                snapped: true,
                snap_target: Some(target),
            }
        }
        None => unsnapped,
    })
}

/// Whether `[start, start + duration)` on `track_id` is clear of every clip
/// not in `exclude`.
pub fn is_slot_free(
    state: &TimelineState,
    track_id: &str,
    start: f64,
    duration: f64,
    exclude: &[&str],
) -> bool {
    start >= -TIME_EPSILON
        && !state
            .clips_on_track(track_id)
            .any(|c| !exclude.contains(&c.id.as_str()) && c.overlaps(start, start + duration))
}

/// The collision-free start closest to `desired`, trying 0, every clip end,
/// and every clip start minus `duration`.
fn nearest_free_start(
    state: &TimelineState,
    track_id: &str,
    desired: f64,
    duration: f64,
    exclude: &[&str],
) -> Option<f64> {
    let mut candidates = vec![0.0];
    for other in state.clips_on_track(track_id) {
        if exclude.contains(&other.id.as_str()) {
            continue;
        }
        candidates.push(other.end_time());
        candidates.push(other.start_time - duration);
    }
    candidates
        .into_iter()
        .filter(|&start| is_slot_free(state, track_id, start, duration, exclude))
        .min_by(|a, b| (a - desired).abs().total_cmp(&(b - desired).abs()))
}

fn moves_within_track(state: &TimelineState, clip_id: &str, track_id: &str) -> bool {
    state.clip(clip_id).is_some_and(|c| c.track_id == track_id)
}

/// Resolve a drop at `desired`.
///
/// On the clip's own track an overlapping drop is allowed and flagged so the
/// caller trims what it covers. On another track the nearest free slot is
/// used instead; if there is none, `no_free_space` is set.
pub fn get_position_with_resistance(
    state: &TimelineState,
    clip_id: &str,
    desired: f64,
    track_id: &str,
    duration: f64,
) -> PlacementResult {
    let desired = desired.max(0.0);
    let exclude = [clip_id];
    if is_slot_free(state, track_id, desired, duration, &exclude) {
        return PlacementResult::free(desired);
    }
    if moves_within_track(state, clip_id, track_id) {
        return PlacementResult::overlapping(desired);
    }
    match nearest_free_start(state, track_id, desired, duration, &exclude) {
        Some(start) => {
            trace!(clip_id, desired, start, "Cross-track drop moved to free slot");
            PlacementResult::free(start)
        }
        None => PlacementResult {
            start_time: desired,
            forcing_overlap: false,
            no_free_space: true,
        },
    }
}

/// Pixel-based variant of [`get_position_with_resistance`]: on the clip's
/// own track the drop sticks to the nearest free slot until the user drags
/// more than `overlap_resistance_px` past it.
pub fn get_position_with_pixel_resistance(
    state: &TimelineState,
    config: &TimelineConfig,
    clip_id: &str,
    desired: f64,
    track_id: &str,
    duration: f64,
    pixels_per_second: f64,
) -> PlacementResult {
    let desired = desired.max(0.0);
    let exclude = [clip_id];
    if is_slot_free(state, track_id, desired, duration, &exclude) {
        return PlacementResult::free(desired);
    }

    let same_track = moves_within_track(state, clip_id, track_id);
    let Some(free) = nearest_free_start(state, track_id, desired, duration, &exclude) else {
        return if same_track {
            PlacementResult::overlapping(desired)
        } else {
            PlacementResult {
                start_time: desired,
                forcing_overlap: false,
                no_free_space: true,
            }
        };
    };
    if !same_track {
        return PlacementResult::free(free);
    }

    let dragged_px = (desired - free).abs() * pixels_per_second;
    if dragged_px > config.overlap_resistance_px {
        PlacementResult::overlapping(desired)
    } else {
        PlacementResult::free(free)
    }
}

/// A start for a clip of `duration` near `desired` that avoids overlaps.
///
/// With one overlapping clip, the closer of "just before it" and "just after
/// it" is used if that slot is free, else the other one. With several, the
/// nearest free candidate wins. Falls back to `desired`.
pub fn find_non_overlapping_position(
    state: &TimelineState,
    clip_id: &str,
    desired: f64,
    track_id: &str,
    duration: f64,
) -> f64 {
    let desired = desired.max(0.0);
    let exclude = [clip_id];
    let overlapping: Vec<&Clip> = state
        .clips_on_track(track_id)
        .filter(|c| c.id != clip_id && c.overlaps(desired, desired + duration))
        .collect();

    match overlapping.as_slice() {
        [] => desired,
        [other] => {
            let before = other.start_time - duration;
            let after = other.end_time();
            let (first, second) = if (desired - before).abs() <= (after - desired).abs() {
                (before, after)
            } else {
                (after, before)
            };
            [first, second]
                .into_iter()
                .find(|&start| is_slot_free(state, track_id, start, duration, &exclude))
                .unwrap_or(desired)
        }
        _ => nearest_free_start(state, track_id, desired, duration, &exclude).unwrap_or(desired),
    }
}

enum Cut {
    Head(f64),
    Tail(f64),
}

/// Resolve the overlap left by placing `clip_id` at `[start, start + duration)`.
///
/// Clips fully covered are deleted together with their linked partners;
/// a clip whose head is covered loses its head; a clip covered at the tail
/// (or in the middle) loses everything after `start`. Partners receive the
/// same cut. Clips joined to `clip_id` by a transition, and clips in
/// `exclude`, are left alone. Returns the ids of deleted clips.
pub fn trim_overlapping_clips(
    state: &mut TimelineState,
    clip_id: &str,
    start: f64,
    track_id: &str,
    duration: f64,
    exclude: &[String],
) -> TimelineResult<Vec<String>> {
    let end = start + duration;
    let targets: Vec<(String, f64, f64)> = state
        .clips_on_track(track_id)
        .filter(|c| {
            c.id != clip_id
                && !exclude.contains(&c.id)
                && c.overlaps(start, end)
                && !joined_by_transition(c, clip_id)
        })
        .map(|c| (c.id.clone(), c.start_time, c.end_time()))
        .collect();

    let mut removed = Vec::new();
    for (id, other_start, other_end) in targets {
        if state.clip(&id).is_none() {
            continue;
        }
        if other_start >= start - TIME_EPSILON && other_end <= end + TIME_EPSILON {
            trace!(clip_id = %id, "Removing fully covered clip");
            removed.extend(remove_clip(state, &id, false)?);
            continue;
        }

        let cut = if other_start >= start - TIME_EPSILON {
            Cut::Head(end - other_start)
        } else {
            Cut::Tail(other_end - start)
        };
        let partner = state.clip(&id).and_then(|c| c.linked_clip_id.clone());
        for target in std::iter::once(id).chain(partner) {
            apply_cut(state, &target, &cut)?;
        }
    }
    Ok(removed)
}

fn joined_by_transition(clip: &Clip, other_id: &str) -> bool {
    clip.transition_in
        .iter()
        .chain(clip.transition_out.iter())
        .any(|t| t.linked_clip_id == other_id)
}

fn apply_cut(state: &mut TimelineState, clip_id: &str, cut: &Cut) -> TimelineResult<()> {
    let clip = state.require_clip_mut(clip_id)?;
    let speed = effective_speed(clip.speed);
    let broken = match *cut {
        Cut::Head(amount) => {
            let amount = amount.min(clip.duration);
            clip.start_time += amount;
            clip.duration -= amount;
            if clip.reversed {
                clip.out_point -= amount * speed;
            } else {
                clip.in_point += amount * speed;
            }
            clip.transition_in.as_ref().map(|t| t.id.clone())
        }
        Cut::Tail(amount) => {
            let amount = amount.min(clip.duration);
            clip.duration -= amount;
            if clip.reversed {
                clip.in_point += amount * speed;
            } else {
                clip.out_point -= amount * speed;
            }
            clip.transition_out.as_ref().map(|t| t.id.clone())
        }
    };
    trace!(clip_id, start = clip.start_time, duration = clip.duration, "Trimmed by overlap");
    if let Some(transition_id) = broken {
        detach_transition(state, &transition_id);
    }
    Ok(())
}
